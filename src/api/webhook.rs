//! Carrier webhook.
//!
//! A `crc_token` (query string, JSON or form body) is echoed back verbatim as
//! uncached plain text. Anything else is acknowledged with `200 OK` before it
//! is looked at; event batches are handed to a background worker, so their
//! processing can never change the answer the carrier already received.

use axum::body::Bytes;
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::api::AppState;
use crate::reconcile::{Reconciler, WebhookBatch};

const CRC_FIELD: &str = "crc_token";

pub fn spawn_worker(reconciler: Arc<Reconciler>, capacity: usize) -> mpsc::Sender<WebhookBatch> {
    let (tx, mut rx) = mpsc::channel::<WebhookBatch>(capacity);
    tokio::spawn(async move {
        while let Some(batch) = rx.recv().await {
            reconciler.apply_events(&batch).await;
        }
        debug!("webhook worker stopped");
    });
    tx
}

fn challenge(token: &str) -> Response {
    (StatusCode::OK, [(CONTENT_TYPE, "text/plain; charset=utf-8"), (CACHE_CONTROL, "no-store")], token.to_string()).into_response()
}

fn ack() -> Response {
    (StatusCode::OK, [(CONTENT_TYPE, "text/plain; charset=utf-8"), (CACHE_CONTROL, "no-store")], "OK").into_response()
}

fn token_in(fields: &HashMap<String, String>) -> Option<&str> {
    fields.get(CRC_FIELD).map(String::as_str).filter(|t| !t.is_empty())
}

/// Subscription handshake, or a plain health check when no token is given.
pub async fn verify(Query(query): Query<HashMap<String, String>>) -> Response {
    match token_in(&query) {
        Some(token) => challenge(token),
        None => ack(),
    }
}

pub async fn receive(State(s): State<AppState>, Query(query): Query<HashMap<String, String>>, request: Request) -> Response {
    if let Some(token) = token_in(&query) {
        return challenge(token);
    }

    let is_form = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    let body = if is_form {
        match Form::<HashMap<String, String>>::from_request(request, &()).await {
            Ok(Form(fields)) => {
                if let Some(token) = token_in(&fields) {
                    return challenge(token);
                }
                serde_json::to_value(fields).unwrap_or(Value::Null)
            }
            Err(e) => {
                warn!(error = %e, "unreadable webhook form");
                return ack();
            }
        }
    } else {
        match Bytes::from_request(request, &()).await {
            Ok(bytes) => serde_json::from_slice::<Value>(&bytes).unwrap_or(Value::Null),
            Err(e) => {
                warn!(error = %e, "unreadable webhook body");
                return ack();
            }
        }
    };

    if let Some(token) = body.get(CRC_FIELD).and_then(Value::as_str).filter(|t| !t.is_empty()) {
        return challenge(token);
    }

    match WebhookBatch::from_value(&body) {
        Some(batch) => {
            debug!(events = batch.events.len(), kind = ?batch.kind, "webhook batch queued");
            match s.webhooks.try_send(batch) {
                Ok(()) => {}
                Err(TrySendError::Full(batch)) => {
                    warn!("webhook queue full; batch waits for room");
                    let tx = s.webhooks.clone();
                    tokio::spawn(async move {
                        if tx.send(batch).await.is_err() {
                            warn!("webhook worker stopped; batch lost");
                        }
                    });
                }
                Err(TrySendError::Closed(_)) => warn!("webhook worker stopped; batch lost"),
            }
        }
        None => debug!("webhook call without events"),
    }
    ack()
}
