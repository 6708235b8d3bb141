//! Parcel creation payload.

use serde::Serialize;

use crate::domain::aggregates::{LineItem, Order};
use crate::domain::value_objects::DeliveryMethod;
use crate::domain::zones::zone_name;

const DEFAULT_CUSTOMER_NAME: &str = "Client";
const DEFAULT_ZONE_NAME: &str = "Alger";
const DEFAULT_ADDRESS: &str = "À préciser";
const DEFAULT_PRODUCT_LIST: &str = "Commande Protecphone";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParcelRequest {
    pub order_id: String,
    pub firstname: String,
    pub familyname: String,
    pub contact_phone: String,
    pub address: String,
    /// Commune data is not modelled; the carrier gets the wilaya name here too.
    pub to_commune_name: String,
    pub to_wilaya_name: String,
    pub product_list: String,
    /// Amount collected on delivery.
    pub price: i64,
    pub freeshipping: bool,
    pub is_stopdesk: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopdesk_id: Option<String>,
    pub has_exchange: u8,
    pub product_to_collect: Option<String>,
}

impl ParcelRequest {
    pub fn from_order(order: &Order) -> Self {
        let (firstname, familyname) = split_name(&order.customer().name);
        let delivery = order.delivery();
        let region = delivery.zone.as_ref().map(zone_name).unwrap_or_else(|| DEFAULT_ZONE_NAME.to_string());
        let address = order.customer().address.trim();
        let is_stopdesk = delivery.method == DeliveryMethod::CarrierOffice;
        Self {
            order_id: order.id().to_string(),
            firstname,
            familyname,
            contact_phone: order.customer().phone.trim().to_string(),
            address: if address.is_empty() { DEFAULT_ADDRESS.to_string() } else { address.to_string() },
            to_commune_name: region.clone(),
            to_wilaya_name: region,
            product_list: product_list(order.items()),
            price: order.total().amount(),
            freeshipping: false,
            is_stopdesk,
            stopdesk_id: if is_stopdesk { delivery.stop_desk.as_ref().map(|d| d.id.clone()) } else { None },
            has_exchange: 0,
            product_to_collect: None,
        }
    }
}

/// First token is the first name, the rest the family name. A single token
/// fills both fields since the carrier requires two.
pub fn split_name(full: &str) -> (String, String) {
    let mut parts = full.split_whitespace();
    let first = parts.next().unwrap_or(DEFAULT_CUSTOMER_NAME).to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    let family = if rest.is_empty() { first.clone() } else { rest };
    (first, family)
}

pub fn product_list(items: &[LineItem]) -> String {
    let list = items
        .iter()
        .map(|item| {
            let mut label = item.name.clone();
            let variant: Vec<&str> = [item.device_model.as_deref(), item.color.as_deref()].into_iter().flatten().collect();
            if !variant.is_empty() { label.push_str(&format!(" [{}]", variant.join(", "))); }
            if item.quantity > 1 { label.push_str(&format!(" x{}", item.quantity)); }
            if item.upsell { label.push_str(" (offre)"); }
            label
        })
        .collect::<Vec<_>>()
        .join(", ");
    if list.is_empty() { DEFAULT_PRODUCT_LIST.to_string() } else { list }
}
