//! Yalidine HTTP client.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::carrier::response::{error_message, parse_creation, parse_statuses, parse_stop_desks};
use crate::carrier::{ensure_not_submitted, Carrier, CarrierCredentials, CarrierError, ParcelRequest, StopDeskInfo};
use crate::domain::aggregates::Order;
use crate::domain::value_objects::{TrackingId, ZoneCode};

pub const DEFAULT_API_BASE: &str = "https://api.yalidine.app/v1/";

pub struct YalidineClient {
    http: Client,
    base_url: String,
    credentials: CarrierCredentials,
    timeout: Duration,
}

impl YalidineClient {
    pub fn new(base_url: &str, credentials: CarrierCredentials, timeout: Duration) -> Result<Self, CarrierError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CarrierError::Unavailable(format!("cannot build HTTP client: {e}")))?;
        let base_url = format!("{}/", base_url.trim().trim_end_matches('/'));
        Ok(Self { http, base_url, credentials, timeout })
    }

    fn url(&self, path: &str) -> String { format!("{}{}", self.base_url, path) }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("X-API-ID", &self.credentials.api_id).header("X-API-TOKEN", &self.credentials.api_token)
    }

    /// Sends the request and returns the decoded body of a 2xx answer.
    /// `None` means the carrier answered 2xx with something that is not JSON.
    async fn send(&self, request: RequestBuilder) -> Result<Option<Value>, CarrierError> {
        let response = self.authed(request).send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        let json = serde_json::from_slice::<Value>(&body).ok();
        if !status.is_success() {
            let message = json.as_ref().and_then(error_message).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            tracing::warn!(status = status.as_u16(), %message, "carrier rejected request");
            return Err(CarrierError::Unavailable(message));
        }
        Ok(json)
    }

    fn transport_error(&self, e: reqwest::Error) -> CarrierError {
        if e.is_timeout() {
            CarrierError::Unavailable(format!("no answer within {}s", self.timeout.as_secs_f32()))
        } else {
            CarrierError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
impl Carrier for YalidineClient {
    async fn submit_parcel(&self, order: &Order) -> Result<TrackingId, CarrierError> {
        ensure_not_submitted(order)?;
        let parcel = ParcelRequest::from_order(order);
        tracing::info!(order_id = %order.id(), price = parcel.price, "creating carrier parcel");
        let body = self.send(self.http.post(self.url("parcels/")).json(&[&parcel])).await?;
        let body = body.ok_or_else(|| CarrierError::NoTrackingReturned("response was not JSON".to_string()))?;
        parse_creation(&body, order.id().as_str())
    }

    async fn query_statuses(&self, trackings: &[TrackingId]) -> Result<HashMap<TrackingId, String>, CarrierError> {
        if trackings.is_empty() {
            return Ok(HashMap::new());
        }
        let joined = trackings.iter().map(TrackingId::as_str).collect::<Vec<_>>().join(",");
        tracing::debug!(count = trackings.len(), "querying carrier statuses");
        let body = self.send(self.http.get(self.url("parcels/")).query(&[("tracking", joined)])).await?;
        body.map(|b| parse_statuses(&b))
            .ok_or_else(|| CarrierError::Unavailable("status response was not JSON".to_string()))
    }

    async fn stop_desks(&self, zone: &ZoneCode) -> Result<Vec<StopDeskInfo>, CarrierError> {
        let wilaya_id = zone.as_str().trim_start_matches('0');
        let body = self.send(self.http.get(self.url("centers/")).query(&[("wilaya_id", wilaya_id)])).await?;
        Ok(body.map(|b| parse_stop_desks(&b)).unwrap_or_default())
    }
}
