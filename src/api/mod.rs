//! HTTP surface for the catalog checkout, the confirmation console and the
//! admin console, plus the carrier webhook.

use axum::routing::{get, patch, post};
use axum::{Json, Router};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::reconcile::{Reconciler, WebhookBatch};
use crate::service::OrderService;

pub mod error;
pub mod orders;
pub mod webhook;

pub use error::ApiError;

const WEBHOOK_QUEUE: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrderService>,
    pub reconciler: Arc<Reconciler>,
    pub webhooks: mpsc::Sender<WebhookBatch>,
}

impl AppState {
    /// Also starts the webhook worker, so it must run inside the runtime.
    pub fn new(service: Arc<OrderService>) -> Self { Self::with_webhook_queue(service, WEBHOOK_QUEUE) }

    pub fn with_webhook_queue(service: Arc<OrderService>, capacity: usize) -> Self {
        let reconciler = Arc::new(Reconciler::new(service.clone()));
        let webhooks = webhook::spawn_worker(reconciler.clone(), capacity);
        Self { service, reconciler, webhooks }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "protecphone-orders"})) }))
        .route("/api/orders", get(orders::list_orders).post(orders::create_order))
        .route("/api/checkout", post(orders::checkout))
        .route("/api/orders/by-tracking/:tracking", get(orders::find_by_tracking))
        .route("/api/orders/:id", axum::routing::delete(orders::delete_order))
        .route("/api/orders/:id/status", patch(orders::set_status))
        .route("/api/orders/:id/carrier", patch(orders::set_carrier_tracking).post(orders::submit_to_carrier))
        .route("/api/carrier/sync", post(orders::sync_carrier))
        .route("/api/carrier/stop-desks", get(orders::stop_desks))
        .route("/api/carrier/webhook", get(webhook::verify).post(webhook::receive))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
