//! Carrier Adapter
//!
//! Translates orders into the carrier's parcel format and carrier answers
//! back into tracking numbers and raw status strings. Nothing here touches
//! the order store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::domain::aggregates::Order;
use crate::domain::value_objects::{TrackingId, ZoneCode};

pub mod parcel;
pub mod response;
pub mod yalidine;

pub use parcel::ParcelRequest;
pub use yalidine::YalidineClient;

#[derive(Debug, Error)]
pub enum CarrierError {
    #[error("carrier credentials are not configured")]
    NotConfigured,

    #[error("order {order_id} already has tracking {tracking}")]
    AlreadySubmitted { order_id: String, tracking: TrackingId },

    #[error("carrier unavailable: {0}")]
    Unavailable(String),

    #[error("carrier returned no tracking number: {0}")]
    NoTrackingReturned(String),
}

/// API id/token pair sent as headers on every carrier call.
#[derive(Clone, Deserialize)]
pub struct CarrierCredentials {
    pub api_id: String,
    pub api_token: String,
}

impl CarrierCredentials {
    /// Both halves must be present and non-blank.
    pub fn from_parts(api_id: Option<String>, api_token: Option<String>) -> Option<Self> {
        let api_id = api_id.filter(|s| !s.trim().is_empty())?;
        let api_token = api_token.filter(|s| !s.trim().is_empty())?;
        Some(Self { api_id, api_token })
    }
}

impl fmt::Debug for CarrierCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CarrierCredentials").field("api_id", &self.api_id).field("api_token", &"***").finish()
    }
}

/// Pickup point offered for carrier-office delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopDeskInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
}

#[async_trait]
pub trait Carrier: Send + Sync {
    /// Creates the parcel and returns its tracking number. Orders that already
    /// carry a tracking number are refused before any network call.
    async fn submit_parcel(&self, order: &Order) -> Result<TrackingId, CarrierError>;

    /// Current raw status of each parcel, in one batched call. Parcels the
    /// carrier does not report are simply absent from the map.
    async fn query_statuses(&self, trackings: &[TrackingId]) -> Result<HashMap<TrackingId, String>, CarrierError>;

    async fn stop_desks(&self, zone: &ZoneCode) -> Result<Vec<StopDeskInfo>, CarrierError>;
}

/// Local idempotency guard shared by every carrier implementation.
pub fn ensure_not_submitted(order: &Order) -> Result<(), CarrierError> {
    match order.tracking() {
        Some(tracking) => Err(CarrierError::AlreadySubmitted { order_id: order.id().to_string(), tracking: tracking.clone() }),
        None => Ok(()),
    }
}
