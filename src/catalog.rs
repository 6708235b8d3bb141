//! Read-only catalog snapshot used at checkout.
//!
//! Product and delivery-fee maintenance belong to the admin console; this
//! service loads them from a JSON file at start-up and only reads them.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::domain::aggregates::Product;
use crate::domain::zones::DeliveryPrices;

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    products: HashMap<String, Product>,
    delivery_prices: DeliveryPrices,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    products: Vec<Product>,
    #[serde(default, alias = "deliveryPrices")]
    delivery_prices: DeliveryPrices,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("cannot read catalog {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("invalid catalog {path}: {source}")]
    Parse { path: String, source: serde_json::Error },
}

impl Catalog {
    pub fn new(products: Vec<Product>, delivery_prices: DeliveryPrices) -> Self {
        Self { products: products.into_iter().map(|p| (p.id().to_string(), p)).collect(), delivery_prices }
    }

    /// Empty product list with the default fee table.
    pub fn with_default_prices() -> Self { Self::new(vec![], DeliveryPrices::defaults()) }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io { path: display.clone(), source })?;
        Self::from_json(&raw).map_err(|source| CatalogError::Parse { path: display, source })
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        Ok(Self::new(file.products, file.delivery_prices.merged_over_defaults()))
    }

    pub fn product(&self, id: &str) -> Option<&Product> { self.products.get(id) }
    pub fn product_mut(&mut self, id: &str) -> Option<&mut Product> { self.products.get_mut(id) }
    pub fn delivery_prices(&self) -> &DeliveryPrices { &self.delivery_prices }
    pub fn len(&self) -> usize { self.products.len() }
    pub fn is_empty(&self) -> bool { self.products.is_empty() }
}
