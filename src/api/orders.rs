use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::api::{ApiError, AppState};
use crate::carrier::StopDeskInfo;
use crate::domain::aggregates::{Cart, CartItem, Customer, Delivery, Order, OrderDraft};
use crate::domain::value_objects::OrderId;
use crate::reconcile::ReconcileReport;
use crate::OrdersError;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "confirmation_code")]
    pub confirmation_code: Option<String>,
    #[serde(flatten)]
    pub draft: OrderDraft,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CustomerInput {
    #[validate(length(max = 120))]
    pub name: String,
    #[validate(length(max = 20))]
    pub phone: String,
    #[serde(default)]
    #[validate(length(max = 300))]
    pub address: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate]
    pub customer: CustomerInput,
    #[serde(default)]
    pub delivery: Delivery,
    #[serde(default)]
    #[validate]
    pub items: Vec<CartItem>,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetTrackingRequest {
    #[serde(default)]
    #[validate(length(max = 64))]
    pub tracking: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct StopDeskQuery {
    pub zone: Option<String>,
}

fn order_id(raw: String) -> ApiResult<OrderId> { OrderId::new(raw).ok_or(ApiError::Orders(OrdersError::MissingField("id"))) }

pub async fn list_orders(State(s): State<AppState>) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(s.service.list_orders().await?))
}

pub async fn create_order(State(s): State<AppState>, Json(r): Json<CreateOrderRequest>) -> ApiResult<(StatusCode, Json<Order>)> {
    let order = s.service.create_order(r.id.as_deref(), r.confirmation_code.as_deref(), r.draft).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn checkout(State(s): State<AppState>, Json(r): Json<CheckoutRequest>) -> ApiResult<(StatusCode, Json<Order>)> {
    r.validate()?;
    let customer = Customer { name: r.customer.name, phone: r.customer.phone, address: r.customer.address };
    let cart = Cart::try_from(r.items)?;
    let order = s.service.checkout(&cart, customer, r.delivery).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn delete_order(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    s.service.delete_order(&order_id(id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_status(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<SetStatusRequest>) -> ApiResult<Json<Order>> {
    Ok(Json(s.service.set_status(&order_id(id)?, r.status.as_deref()).await?))
}

pub async fn set_carrier_tracking(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<SetTrackingRequest>) -> ApiResult<Json<Order>> {
    r.validate()?;
    Ok(Json(s.service.set_carrier_tracking(&order_id(id)?, r.tracking.as_deref(), r.submitted_at).await?))
}

pub async fn submit_to_carrier(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Order>> {
    Ok(Json(s.service.submit_to_carrier(&order_id(id)?).await?))
}

/// `null` when no order carries the tracking number.
pub async fn find_by_tracking(State(s): State<AppState>, Path(tracking): Path<String>) -> ApiResult<Json<Option<Order>>> {
    Ok(Json(s.service.find_by_tracking(&tracking).await?))
}

pub async fn sync_carrier(State(s): State<AppState>) -> ApiResult<Json<ReconcileReport>> {
    Ok(Json(s.reconciler.poll().await?))
}

pub async fn stop_desks(State(s): State<AppState>, Query(q): Query<StopDeskQuery>) -> ApiResult<Json<Vec<StopDeskInfo>>> {
    Ok(Json(s.service.stop_desks(q.zone.as_deref()).await?))
}

#[cfg(test)]
mod tests {
    use crate::api::{router, AppState};
    use crate::domain::aggregates::order::tests::draft;
    use crate::service::tests::{service_with, FakeCarrier};
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router { router(AppState::new(Arc::new(service_with(Arc::new(FakeCarrier::new("yal-123")))))) }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri).header("content-type", "application/json");
        let request = request.body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty)).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn create_body(id: &str) -> Value {
        let mut body = serde_json::to_value(draft()).unwrap();
        body["id"] = json!(id);
        body["confirmationCode"] = json!("123456");
        body
    }

    #[tokio::test]
    async fn test_create_list_submit_find() {
        let app = app();
        let (status, created) = call(&app, Method::POST, "/api/orders", Some(create_body("CMD-1"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "attempt-1");
        assert_eq!(created["total"], 3390);

        let (_, list) = call(&app, Method::GET, "/api/orders", None).await;
        assert_eq!(list[0]["id"], "CMD-1");

        let (status, submitted) = call(&app, Method::POST, "/api/orders/CMD-1/carrier", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(submitted["carrier"]["tracking"], "YAL-123");

        let (status, again) = call(&app, Method::POST, "/api/orders/CMD-1/carrier", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(again["kind"], "already_submitted");
        assert_eq!(again["tracking"], "YAL-123");

        let (_, found) = call(&app, Method::GET, "/api/orders/by-tracking/yal-123", None).await;
        assert_eq!(found["id"], "CMD-1");
        let (status, missing) = call(&app, Method::GET, "/api/orders/by-tracking/YAL-999", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(missing.is_null());
    }

    #[tokio::test]
    async fn test_create_without_id_is_bad_request() {
        let app = app();
        let mut body = create_body("CMD-1");
        body.as_object_mut().unwrap().remove("id");
        let (status, err) = call(&app, Method::POST, "/api/orders", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["kind"], "validation");
    }

    #[tokio::test]
    async fn test_create_with_wrong_total_is_rejected() {
        let app = app();
        let mut body = create_body("CMD-9");
        body["total"] = json!(1);
        let (status, err) = call(&app, Method::POST, "/api/orders", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["kind"], "validation");
        let (_, list) = call(&app, Method::GET, "/api/orders", None).await;
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn test_set_status() {
        let app = app();
        call(&app, Method::POST, "/api/orders", Some(create_body("CMD-1"))).await;
        let (status, err) = call(&app, Method::PATCH, "/api/orders/CMD-1/status", Some(json!({"status": "shipped"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["retryable"], false);
        let (status, order) = call(&app, Method::PATCH, "/api/orders/CMD-1/status", Some(json!({"status": "confirmed"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], "confirmed");
        let (status, _) = call(&app, Method::PATCH, "/api/orders/CMD-9/status", Some(json!({"status": "confirmed"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_manual_tracking() {
        let app = app();
        call(&app, Method::POST, "/api/orders", Some(create_body("CMD-1"))).await;
        let (status, _) = call(&app, Method::PATCH, "/api/orders/CMD-1/carrier", Some(json!({"tracking": "yal-5"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = json!({"tracking": "yal-5", "submitted_at": "2026-10-01T10:00:00Z"});
        let (status, order) = call(&app, Method::PATCH, "/api/orders/CMD-1/carrier", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["carrier"]["tracking"], "YAL-5");
    }

    #[tokio::test]
    async fn test_checkout_prices_on_server() {
        let app = app();
        let body = json!({
            "customer": {"name": "Amine Benali", "phone": "0555123456", "address": "Alger"},
            "delivery": {"zone": "16", "method": "domicile"},
            "items": [{"product_id": "ac-1", "quantity": 2}]
        });
        let (status, order) = call(&app, Method::POST, "/api/checkout", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["total"], 2 * 2900 + 490);
        assert!(order["id"].as_str().unwrap().starts_with("CMD-"));

        let (status, err) = call(&app, Method::POST, "/api/checkout", Some(json!({"customer": {"name": "A", "phone": "1"}}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "Cart is empty");
    }

    #[tokio::test]
    async fn test_checkout_rejects_oversized_quantities() {
        let app = app();
        let customer = json!({"name": "Amine Benali", "phone": "0555123456"});
        let body = json!({"customer": customer, "items": [{"product_id": "ac-1", "quantity": 4294967295u32}, {"product_id": "ac-1", "quantity": 1}]});
        let (status, err) = call(&app, Method::POST, "/api/checkout", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["kind"], "validation");

        let body = json!({"customer": customer, "items": [{"product_id": "ac-1", "quantity": 600}, {"product_id": "ac-1", "quantity": 600}]});
        let (status, err) = call(&app, Method::POST, "/api/checkout", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err["error"], "Invalid quantity for product ac-1");
    }

    #[tokio::test]
    async fn test_sync_and_delete() {
        let app = app();
        let (status, report) = call(&app, Method::POST, "/api/carrier/sync", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["updated"], 0);

        call(&app, Method::POST, "/api/orders", Some(create_body("CMD-1"))).await;
        let (status, _) = call(&app, Method::DELETE, "/api/orders/CMD-1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, Method::DELETE, "/api/orders/CMD-1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stop_desks() {
        let (status, desks) = call(&app(), Method::GET, "/api/carrier/stop-desks?zone=16", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(desks[0]["id"], "160101");
    }
}
