//! Product Aggregate
//!
//! The catalog is owned by the admin console; orders only read the retail price.

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    price: Money,
    #[serde(default, alias = "wholesalePrice")]
    wholesale_cost: Money,
    #[serde(default, alias = "quantity")]
    stock: u32,
    #[serde(default, alias = "compatibleWith")]
    compatible_models: Vec<String>,
    #[serde(default, alias = "colorIds")]
    colors: Vec<String>,
    #[serde(default, alias = "photoGallery")]
    photos: Vec<String>,
}

impl Product {
    pub fn create(id: impl Into<String>, name: impl Into<String>, price: Money) -> Self {
        Self {
            id: id.into(), name: name.into(), description: String::new(), price,
            wholesale_cost: Money::ZERO, stock: 0, compatible_models: vec![], colors: vec![], photos: vec![],
        }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn price(&self) -> Money { self.price }
    pub fn stock(&self) -> u32 { self.stock }
    pub fn compatible_models(&self) -> &[String] { &self.compatible_models }
    pub fn colors(&self) -> &[String] { &self.colors }

    pub fn update_price(&mut self, new_price: Money) { self.price = new_price; }
}
