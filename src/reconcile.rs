//! Carrier Status Reconciler
//!
//! Maps the carrier's free-text parcel statuses onto the order state machine.
//! Webhook pushes and operator-triggered polls end up in the same per-order
//! apply step. A single bad event or order is counted and skipped; only a
//! failed batch query aborts a poll, and it does so before touching anything.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::aggregates::Order;
use crate::domain::status::{Actor, OrderStatus};
use crate::domain::value_objects::TrackingId;
use crate::service::OrderService;
use crate::{OrdersError, Result};

// =============================================================================
// Status mapping
// =============================================================================

/// Result of reading a raw carrier status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusMapping {
    Mapped(OrderStatus),
    /// More than one category matched; the first in precedence order is used.
    Ambiguous { chosen: OrderStatus, matched: Vec<OrderStatus> },
    Unmapped,
}

impl StatusMapping {
    pub fn status(&self) -> Option<OrderStatus> {
        match self {
            Self::Mapped(s) | Self::Ambiguous { chosen: s, .. } => Some(*s),
            Self::Unmapped => None,
        }
    }
}

/// Matchers in precedence order.
const RULES: [(OrderStatus, fn(&str) -> bool); 3] = [
    (OrderStatus::Delivered, delivered),
    (OrderStatus::Returned, returned),
    (OrderStatus::Cancelled, cancelled),
];

/// "livré", "livrée", "livre"; not "livraison" (in transit) nor "livreur".
fn delivered(raw: &str) -> bool {
    raw == "delivered"
        || raw.match_indices("livr").any(|(i, k)| {
            let rest = &raw[i + k.len()..];
            (rest.starts_with('e') || rest.starts_with('é')) && !rest.starts_with("eur")
        })
}

fn returned(raw: &str) -> bool { raw.contains("retour") || raw == "returned" }

fn cancelled(raw: &str) -> bool { raw.contains("annul") || raw.contains("refus") || raw == "cancelled" || raw == "canceled" }

pub fn classify(raw: &str) -> StatusMapping {
    let raw = raw.trim().to_lowercase();
    let matched: Vec<OrderStatus> = RULES.iter().filter(|(_, matches)| matches(&raw)).map(|(status, _)| *status).collect();
    match matched.len() {
        0 => StatusMapping::Unmapped,
        1 => StatusMapping::Mapped(matched[0]),
        _ => StatusMapping::Ambiguous { chosen: matched[0], matched },
    }
}

pub fn map_carrier_status(raw: &str) -> Option<OrderStatus> { classify(raw).status() }

// =============================================================================
// Webhook payload
// =============================================================================

/// `{"type": "...", "events": [{"data": {...}}]}`. A bare single parcel object
/// is accepted as a batch of one.
#[derive(Clone, Debug, Default)]
pub struct WebhookBatch {
    pub kind: Option<String>,
    pub events: Vec<WebhookEvent>,
    /// Entries of `events` that were not objects; skipped at decode time.
    pub malformed: usize,
}

#[derive(Clone, Debug)]
pub struct WebhookEvent {
    pub event_id: Option<String>,
    pub data: Value,
}

const EVENT_TRACKING_FIELDS: [&str; 3] = ["tracking", "tracking_number", "parcel_id"];
const EVENT_STATUS_FIELDS: [&str; 4] = ["status", "state", "etat", "last_status"];

impl WebhookBatch {
    /// `None` when the body carries no event at all. Each event is decoded on
    /// its own so one bad entry never costs the rest of the batch.
    pub fn from_value(body: &Value) -> Option<Self> {
        if let Some(entries) = body.get("events").and_then(Value::as_array) {
            let mut batch = Self { kind: text_field(body, &["type"]), ..Self::default() };
            for entry in entries {
                match WebhookEvent::from_value(entry) {
                    Some(event) => batch.events.push(event),
                    None => {
                        warn!(event = %entry, "malformed webhook event skipped");
                        batch.malformed += 1;
                    }
                }
            }
            return (!batch.events.is_empty() || batch.malformed > 0).then_some(batch);
        }
        let single = EVENT_TRACKING_FIELDS.iter().any(|f| body.get(*f).is_some());
        single.then(|| Self { events: vec![WebhookEvent { event_id: None, data: body.clone() }], ..Self::default() })
    }
}

impl WebhookEvent {
    fn from_value(entry: &Value) -> Option<Self> {
        let fields = entry.as_object()?;
        Some(Self { event_id: text_field(entry, &["event_id"]), data: fields.get("data").cloned().unwrap_or_default() })
    }

    pub fn tracking(&self) -> Option<TrackingId> { text_field(&self.data, &EVENT_TRACKING_FIELDS).and_then(TrackingId::new) }
    pub fn raw_status(&self) -> Option<String> { text_field(&self.data, &EVENT_STATUS_FIELDS) }
}

fn text_field(value: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match value.get(*name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

// =============================================================================
// Reconciler
// =============================================================================

/// Per-run counters surfaced to the operator ("N orders updated").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub examined: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub unmapped: usize,
    pub ambiguous: usize,
    pub skipped: usize,
}

pub struct Reconciler {
    service: Arc<OrderService>,
}

impl Reconciler {
    pub fn new(service: Arc<OrderService>) -> Self { Self { service } }

    /// Applies a webhook batch in delivery order; a later event for the same
    /// parcel wins.
    pub async fn apply_events(&self, batch: &WebhookBatch) -> ReconcileReport {
        let mut report = ReconcileReport { examined: batch.malformed, skipped: batch.malformed, ..ReconcileReport::default() };
        for event in &batch.events {
            report.examined += 1;
            let (Some(tracking), Some(raw)) = (event.tracking(), event.raw_status()) else {
                warn!(event_id = ?event.event_id, "webhook event without tracking or status");
                report.skipped += 1;
                continue;
            };
            match self.service.store().find_by_tracking(&tracking).await {
                Ok(Some(order)) => self.apply(&order, &raw, &mut report).await,
                Ok(None) => {
                    debug!(%tracking, "webhook event for unknown parcel");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(%tracking, error = %e, "cannot resolve webhook parcel");
                    report.skipped += 1;
                }
            }
        }
        info!(kind = ?batch.kind, ?report, "webhook batch reconciled");
        report
    }

    /// Queries the carrier for every tracked order, terminal ones included,
    /// and applies what it reports. Returns without calling the carrier when
    /// nothing is tracked.
    pub async fn poll(&self) -> Result<ReconcileReport> {
        let orders = self.service.store().list_tracked().await?;
        if orders.is_empty() {
            debug!("no tracked orders to reconcile");
            return Ok(ReconcileReport::default());
        }
        let carrier = self.service.carrier()?;
        let trackings: Vec<TrackingId> = orders.iter().filter_map(Order::tracking).cloned().collect::<BTreeSet<_>>().into_iter().collect();
        let statuses = carrier.query_statuses(&trackings).await.map_err(|e| {
            warn!(error = %e, count = trackings.len(), "carrier status query failed; nothing applied");
            OrdersError::from(e)
        })?;

        let mut report = ReconcileReport::default();
        for order in &orders {
            report.examined += 1;
            match order.tracking().and_then(|t| statuses.get(t)) {
                Some(raw) => self.apply(order, raw, &mut report).await,
                None => {
                    debug!(order_id = %order.id(), "carrier did not report this parcel");
                    report.skipped += 1;
                }
            }
        }
        info!(?report, "carrier poll reconciled");
        Ok(report)
    }

    async fn apply(&self, order: &Order, raw: &str, report: &mut ReconcileReport) {
        let mapping = classify(raw);
        let target = match &mapping {
            StatusMapping::Unmapped => {
                debug!(order_id = %order.id(), status = raw, "carrier status not mapped");
                report.unmapped += 1;
                return;
            }
            StatusMapping::Ambiguous { chosen, matched } => {
                warn!(order_id = %order.id(), status = raw, ?matched, %chosen, "ambiguous carrier status; review manually");
                report.ambiguous += 1;
                *chosen
            }
            StatusMapping::Mapped(status) => *status,
        };
        match self.service.change_status(order.id(), target, Actor::Carrier).await {
            Ok((_, transition)) if transition.is_applied() => report.updated += 1,
            Ok(_) => report.unchanged += 1,
            Err(e) => {
                warn!(order_id = %order.id(), status = raw, error = %e, "carrier status not applied");
                report.skipped += 1;
            }
        }
    }
}
