//! Pricing Snapshot Builder
//!
//! Copies the current retail price of every cart line into the draft. Two
//! checkouts of the same cart around a catalog price change therefore yield
//! different totals, while an already placed order keeps its own.

use crate::catalog::Catalog;
use crate::domain::aggregates::{Cart, Customer, Delivery, LineItem, OrderDraft};
use crate::domain::value_objects::{DeliveryMethod, Money};
use crate::{OrdersError, Result};

/// Cross-sell lines accepted at checkout are half price.
pub const UPSELL_DISCOUNT_PERCENT: u8 = 50;

pub fn snapshot(cart: &Cart, catalog: &Catalog, customer: Customer, delivery: Delivery) -> Result<OrderDraft> {
    if cart.is_empty() { return Err(OrdersError::EmptyCart); }
    if customer.name.trim().is_empty() { return Err(OrdersError::MissingField("customer.name")); }
    if customer.phone.trim().is_empty() { return Err(OrdersError::MissingField("customer.phone")); }
    if delivery.method == DeliveryMethod::CarrierOffice {
        if delivery.zone.is_none() { return Err(OrdersError::DeliveryZoneRequired(delivery.method)); }
        if delivery.stop_desk.is_none() { return Err(OrdersError::MissingField("delivery.stop_desk")); }
    }

    let items = cart
        .items()
        .iter()
        .map(|item| {
            let product = catalog.product(&item.product_id).ok_or_else(|| OrdersError::ProductNotFound(item.product_id.clone()))?;
            let unit_price = if item.upsell { product.price().discounted(UPSELL_DISCOUNT_PERCENT) } else { product.price() };
            Ok(LineItem {
                product_id: product.id().to_string(),
                name: product.name().to_string(),
                unit_price,
                quantity: item.quantity,
                device_model: item.device_model.clone(),
                color: item.color.clone(),
                upsell: item.upsell,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let delivery_fee = delivery
        .zone
        .as_ref()
        .map(|zone| catalog.delivery_prices().fee(zone, delivery.method))
        .unwrap_or(Money::ZERO);
    let mut draft = OrderDraft { customer, delivery, items, delivery_fee, total: Money::ZERO };
    draft.total = draft.computed_total().ok_or_else(|| OrdersError::InvalidAmounts("amount overflow".into()))?;
    Ok(draft)
}
