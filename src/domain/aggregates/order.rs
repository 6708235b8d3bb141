//! Order Aggregate
//!
//! Line items, the delivery fee and the total are frozen when the order is
//! placed. After that only the status (through the state machine) and the
//! carrier handoff (once) may change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::cart::MAX_LINE_QUANTITY;
use crate::domain::events::OrderEvent;
use crate::domain::status::{self, Actor, OrderStatus, Transition};
use crate::domain::value_objects::{ConfirmationCode, DeliveryMethod, Money, OrderId, TrackingId, ZoneCode};
use crate::{OrdersError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer { pub name: String, pub phone: String, #[serde(default)] pub address: String }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopDesk { pub id: String, pub name: String }

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    #[serde(default)]
    pub zone: Option<ZoneCode>,
    #[serde(default)]
    pub method: DeliveryMethod,
    #[serde(default)]
    pub stop_desk: Option<StopDesk>,
}

/// Price snapshot of one cart line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    #[serde(default)]
    pub device_model: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub upsell: bool,
}

impl LineItem {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }
}

impl OrderDraft {
    /// Σ line totals + delivery fee; `None` on overflow.
    pub fn computed_total(&self) -> Option<Money> {
        self.items.iter().try_fold(self.delivery_fee, |sum, item| item.unit_price.checked_mul(item.quantity).and_then(|line| sum.checked_add(line)))
    }

    fn check(&self) -> Result<()> {
        if self.items.is_empty() { return Err(OrdersError::EmptyCart); }
        if let Some(item) = self.items.iter().find(|i| i.quantity == 0 || i.quantity > MAX_LINE_QUANTITY) {
            return Err(OrdersError::InvalidQuantity(item.product_id.clone()));
        }
        if self.delivery_fee < Money::ZERO || self.items.iter().any(|i| i.unit_price < Money::ZERO) {
            return Err(OrdersError::InvalidAmounts("negative price or fee".into()));
        }
        match self.computed_total() {
            Some(expected) if expected == self.total => Ok(()),
            Some(expected) => Err(OrdersError::InvalidAmounts(format!("total {} does not match items and delivery ({expected})", self.total))),
            None => Err(OrdersError::InvalidAmounts("amount overflow".into())),
        }
    }
}

/// Everything about an order except its identity and workflow state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub customer: Customer,
    #[serde(default)]
    pub delivery: Delivery,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub delivery_fee: Money,
    pub total: Money,
}

/// Tracking number and the moment the parcel was created at the carrier.
/// Both are present or neither is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierHandoff { pub tracking: TrackingId, pub submitted_at: DateTime<Utc> }

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    confirmation_code: ConfirmationCode,
    customer: Customer,
    delivery: Delivery,
    items: Vec<LineItem>,
    delivery_fee: Money,
    total: Money,
    status: OrderStatus,
    carrier: Option<CarrierHandoff>,
    created_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<OrderEvent>,
}

impl Order {
    pub fn place(id: OrderId, confirmation_code: ConfirmationCode, draft: OrderDraft, now: DateTime<Utc>) -> Result<Self> {
        draft.check()?;
        let mut order = Self::restore(id, confirmation_code, draft, OrderStatus::Attempt1, None, now);
        order.raise_event(OrderEvent::Placed { order_id: order.id.clone(), total: order.total });
        Ok(order)
    }

    /// Rebuilds a stored order without raising events.
    pub fn restore(
        id: OrderId, confirmation_code: ConfirmationCode, draft: OrderDraft, status: OrderStatus,
        carrier: Option<CarrierHandoff>, created_at: DateTime<Utc>,
    ) -> Self {
        let OrderDraft { customer, delivery, items, delivery_fee, total } = draft;
        Self { id, confirmation_code, customer, delivery, items, delivery_fee, total, status, carrier, created_at, events: vec![] }
    }

    pub fn id(&self) -> &OrderId { &self.id }
    pub fn confirmation_code(&self) -> &ConfirmationCode { &self.confirmation_code }
    pub fn customer(&self) -> &Customer { &self.customer }
    pub fn delivery(&self) -> &Delivery { &self.delivery }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn delivery_fee(&self) -> Money { self.delivery_fee }
    pub fn total(&self) -> Money { self.total }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn carrier(&self) -> Option<&CarrierHandoff> { self.carrier.as_ref() }
    pub fn tracking(&self) -> Option<&TrackingId> { self.carrier.as_ref().map(|c| &c.tracking) }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    pub fn to_draft(&self) -> OrderDraft {
        OrderDraft {
            customer: self.customer.clone(), delivery: self.delivery.clone(), items: self.items.clone(),
            delivery_fee: self.delivery_fee, total: self.total,
        }
    }

    pub fn apply_status(&mut self, to: OrderStatus, actor: Actor) -> Result<Transition> {
        let transition = status::transition(self.status, to, actor)?;
        if let Transition::Applied { from, to } = transition {
            self.status = to;
            self.raise_event(OrderEvent::StatusChanged { order_id: self.id.clone(), from, to, actor });
        }
        Ok(transition)
    }

    pub fn record_handoff(&mut self, handoff: CarrierHandoff) -> Result<()> {
        if let Some(existing) = &self.carrier {
            return Err(OrdersError::AlreadySubmitted { order_id: self.id.to_string(), tracking: existing.tracking.clone() });
        }
        self.raise_event(OrderEvent::HandedToCarrier { order_id: self.id.clone(), tracking: handoff.tracking.clone() });
        self.carrier = Some(handoff);
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(e); }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn draft() -> OrderDraft {
        OrderDraft {
            customer: Customer { name: "Amine Benali".into(), phone: "0555123456".into(), address: "12 rue Didouche".into() },
            delivery: Delivery { zone: ZoneCode::new("16"), method: DeliveryMethod::Home, stop_desk: None },
            items: vec![LineItem {
                product_id: "ac-1".into(), name: "Antichoc MagSafe".into(), unit_price: Money::dzd(2900), quantity: 1,
                device_model: Some("iphone-15".into()), color: None, upsell: false,
            }],
            delivery_fee: Money::dzd(490),
            total: Money::dzd(3390),
        }
    }

    pub(crate) fn order(id: &str) -> Order {
        Order::place(OrderId::new(id).unwrap(), ConfirmationCode::new("123456").unwrap(), draft(), Utc::now()).unwrap()
    }

    #[test]
    fn test_place_starts_at_first_attempt() {
        let mut o = order("CMD-1");
        assert_eq!(o.status(), OrderStatus::Attempt1);
        assert!(o.tracking().is_none());
        assert!(matches!(o.take_events().as_slice(), [OrderEvent::Placed { total, .. }] if *total == Money::dzd(3390)));
    }

    #[test]
    fn test_place_rejects_empty_items() {
        let mut d = draft();
        d.items.clear();
        let r = Order::place(OrderId::new("CMD-1").unwrap(), ConfirmationCode::new("1").unwrap(), d, Utc::now());
        assert!(matches!(r, Err(OrdersError::EmptyCart)));
    }

    #[test]
    fn test_place_rejects_inconsistent_amounts() {
        let place = |d: OrderDraft| Order::place(OrderId::new("CMD-9").unwrap(), ConfirmationCode::new("123456").unwrap(), d, Utc::now());

        let mut wrong_total = draft();
        wrong_total.total = Money::dzd(1);
        assert!(matches!(place(wrong_total), Err(OrdersError::InvalidAmounts(_))));

        let mut zero = draft();
        zero.items[0].quantity = 0;
        assert!(matches!(place(zero), Err(OrdersError::InvalidQuantity(p)) if p == "ac-1"));

        let mut negative = draft();
        negative.items[0].unit_price = Money::dzd(-2900);
        negative.total = Money::dzd(-2410);
        assert!(matches!(place(negative), Err(OrdersError::InvalidAmounts(_))));

        let mut huge = draft();
        huge.items[0].unit_price = Money::dzd(i64::MAX);
        huge.items[0].quantity = 2;
        assert!(matches!(place(huge), Err(OrdersError::InvalidAmounts(m)) if m == "amount overflow"));

        assert_eq!(draft().computed_total(), Some(Money::dzd(3390)));
    }

    #[test]
    fn test_order_workflow() {
        let mut o = order("CMD-1");
        o.take_events();
        o.apply_status(OrderStatus::Attempt2, Actor::Operator).unwrap();
        o.apply_status(OrderStatus::Confirmed, Actor::Operator).unwrap();
        assert!(o.apply_status(OrderStatus::Delivered, Actor::Carrier).unwrap().is_applied());
        assert_eq!(o.apply_status(OrderStatus::Cancelled, Actor::Carrier).unwrap(), Transition::Unchanged);
        assert_eq!(o.status(), OrderStatus::Delivered);
        assert_eq!(o.take_events().len(), 3);
    }

    #[test]
    fn test_handoff_recorded_once() {
        let mut o = order("CMD-1");
        let first = CarrierHandoff { tracking: TrackingId::new("yal-123").unwrap(), submitted_at: Utc::now() };
        o.record_handoff(first).unwrap();
        let second = CarrierHandoff { tracking: TrackingId::new("yal-999").unwrap(), submitted_at: Utc::now() };
        assert!(matches!(o.record_handoff(second), Err(OrdersError::AlreadySubmitted { tracking, .. }) if tracking.as_str() == "YAL-123"));
        assert_eq!(o.tracking().unwrap().as_str(), "YAL-123");
    }
}
