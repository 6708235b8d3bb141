//! Domain events
//!
//! Raised by the order aggregate and published by the service after the
//! store write succeeds. Nothing inside the core reacts to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::status::{Actor, OrderStatus};
use crate::domain::value_objects::{Money, OrderId, TrackingId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: OrderId, total: Money },
    StatusChanged { order_id: OrderId, from: OrderStatus, to: OrderStatus, actor: Actor },
    HandedToCarrier { order_id: OrderId, tracking: TrackingId },
}

impl OrderEvent {
    pub fn order_id(&self) -> &OrderId {
        match self {
            Self::Placed { order_id, .. } | Self::StatusChanged { order_id, .. } | Self::HandedToCarrier { order_id, .. } => order_id,
        }
    }

    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "orders.placed",
            Self::StatusChanged { .. } => "orders.status_changed",
            Self::HandedToCarrier { .. } => "orders.handed_to_carrier",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: OrderEvent,
}

impl From<OrderEvent> for EventEnvelope {
    fn from(event: OrderEvent) -> Self { Self { event_id: Uuid::now_v7(), occurred_at: Utc::now(), event } }
}
