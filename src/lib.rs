//! Protecphone Orders
//!
//! Cash-on-delivery order service for a phone-accessory shop in Algeria.
//!
//! ## Features
//! - Checkout with frozen pricing snapshots
//! - Call-center confirmation workflow (order state machine)
//! - Parcel handoff to the Yalidine carrier
//! - Carrier status reconciliation (webhook push and polling pull)

pub mod api;
pub mod carrier;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod reconcile;
pub mod service;
pub mod store;

use thiserror::Error;

use crate::carrier::CarrierError;
use crate::domain::status::OrderStatus;
use crate::domain::value_objects::{DeliveryMethod, TrackingId};
use crate::store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum OrdersError {
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Delivery zone required for {0} delivery")]
    DeliveryZoneRequired(DeliveryMethod),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid quantity for product {0}")]
    InvalidQuantity(String),

    #[error("Invalid order amounts: {0}")]
    InvalidAmounts(String),

    #[error("Tracking number already used by another order: {0}")]
    DuplicateTracking(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Cannot move order from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Order already exists: {0}")]
    DuplicateOrder(String),

    #[error("Order {order_id} already sent to carrier (tracking {tracking})")]
    AlreadySubmitted { order_id: String, tracking: TrackingId },

    #[error("Order {0} is being sent to the carrier")]
    SubmissionInProgress(String),

    #[error("Carrier unavailable: {0}")]
    CarrierUnavailable(String),

    #[error("Carrier returned no tracking number: {0}")]
    NoTrackingReturned(String),

    #[error("Carrier credentials are not configured")]
    CarrierNotConfigured,

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Coarse classification used by the consoles to pick an operator message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    AlreadySubmitted,
    NotFound,
    CarrierUnavailable,
    NoTracking,
    Configuration,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::AlreadySubmitted => "already_submitted",
            Self::NotFound => "not_found",
            Self::CarrierUnavailable => "carrier_unavailable",
            Self::NoTracking => "no_tracking",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

impl OrdersError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidStatus(_)
            | Self::EmptyCart
            | Self::DeliveryZoneRequired(_)
            | Self::MissingField(_)
            | Self::ProductNotFound(_)
            | Self::InvalidQuantity(_)
            | Self::InvalidAmounts(_)
            | Self::DuplicateTracking(_)
            | Self::IllegalTransition { .. }
            | Self::DuplicateOrder(_) => ErrorKind::Validation,
            Self::OrderNotFound(_) => ErrorKind::NotFound,
            Self::AlreadySubmitted { .. } | Self::SubmissionInProgress(_) => ErrorKind::AlreadySubmitted,
            Self::CarrierUnavailable(_) => ErrorKind::CarrierUnavailable,
            Self::NoTrackingReturned(_) => ErrorKind::NoTracking,
            Self::CarrierNotConfigured => ErrorKind::Configuration,
            Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Only transport-level carrier failures are worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::CarrierUnavailable
    }
}

impl From<StoreError> for OrdersError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(id) => OrdersError::DuplicateOrder(id),
            StoreError::DuplicateTracking(tracking) => OrdersError::DuplicateTracking(tracking),
            other => OrdersError::Storage(other.to_string()),
        }
    }
}

impl From<CarrierError> for OrdersError {
    fn from(e: CarrierError) -> Self {
        match e {
            CarrierError::NotConfigured => OrdersError::CarrierNotConfigured,
            CarrierError::AlreadySubmitted { order_id, tracking } => {
                OrdersError::AlreadySubmitted { order_id, tracking }
            }
            CarrierError::Unavailable(msg) => OrdersError::CarrierUnavailable(msg),
            CarrierError::NoTrackingReturned(msg) => OrdersError::NoTrackingReturned(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrdersError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinct_for_console_messages() {
        let already = OrdersError::AlreadySubmitted { order_id: "CMD-1".into(), tracking: TrackingId::new("yal-1").unwrap() };
        let down = OrdersError::CarrierUnavailable("timeout".into());
        let none = OrdersError::NoTrackingReturned("no field".into());
        assert_eq!(already.kind(), ErrorKind::AlreadySubmitted);
        assert_eq!(down.kind(), ErrorKind::CarrierUnavailable);
        assert_eq!(none.kind(), ErrorKind::NoTracking);
        assert!(down.is_retryable());
        assert!(!already.is_retryable());
        assert!(!none.is_retryable());
    }

    #[test]
    fn test_carrier_error_conversion() {
        let e: OrdersError = CarrierError::NotConfigured.into();
        assert_eq!(e.kind(), ErrorKind::Configuration);
        let e: OrdersError = CarrierError::Unavailable("HTTP 503".into()).into();
        assert!(matches!(e, OrdersError::CarrierUnavailable(m) if m == "HTTP 503"));
    }
}
