//! Cart Aggregate
//!
//! A cart only references live products; prices are attached when the
//! pricing snapshot is taken at checkout.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{OrdersError, Result};

/// Upper bound for one cart line, merged quantities included.
pub const MAX_LINE_QUANTITY: u32 = 1000;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CartItem {
    pub product_id: String,
    #[serde(default)]
    pub device_model: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "one")]
    #[validate(range(min = 1, max = 1000))]
    pub quantity: u32,
    /// Accepted from the checkout cross-sell offer.
    #[serde(default)]
    pub upsell: bool,
}

fn one() -> u32 { 1 }

impl CartItem {
    pub fn new(product_id: impl Into<String>) -> Self {
        Self { product_id: product_id.into(), device_model: None, color: None, quantity: 1, upsell: false }
    }
    pub fn for_model(mut self, model: impl Into<String>) -> Self { self.device_model = Some(model.into()); self }
    pub fn in_color(mut self, color: impl Into<String>) -> Self { self.color = Some(color.into()); self }
    pub fn as_upsell(mut self) -> Self { self.upsell = true; self }
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Same product, variant and offer merge into one line. A zero quantity
    /// is ignored; a line above `MAX_LINE_QUANTITY` is rejected and the cart
    /// left as it was.
    pub fn add_item(&mut self, item: CartItem) -> Result<()> {
        if item.quantity == 0 { return Ok(()); }
        let too_many = || OrdersError::InvalidQuantity(item.product_id.clone());
        match self.items.iter_mut().find(|i| i.product_id == item.product_id && i.device_model == item.device_model && i.color == item.color && i.upsell == item.upsell) {
            Some(existing) => {
                existing.quantity = existing.quantity.checked_add(item.quantity).filter(|q| *q <= MAX_LINE_QUANTITY).ok_or_else(too_many)?;
            }
            None if item.quantity > MAX_LINE_QUANTITY => return Err(too_many()),
            None => self.items.push(item),
        }
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        self.items.len() != before
    }
}

impl TryFrom<Vec<CartItem>> for Cart {
    type Error = OrdersError;

    fn try_from(items: Vec<CartItem>) -> Result<Self> {
        let mut cart = Cart::new();
        for item in items { cart.add_item(item)?; }
        Ok(cart)
    }
}
