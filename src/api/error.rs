use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use validator::ValidationErrors;

use crate::{ErrorKind, OrdersError};

/// Error body shared by every endpoint: `{"error", "kind", "retryable"}`.
#[derive(Debug)]
pub enum ApiError {
    Orders(OrdersError),
    Invalid(ValidationErrors),
}

impl From<OrdersError> for ApiError {
    fn from(e: OrdersError) -> Self { Self::Orders(e) }
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self { Self::Invalid(e) }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadySubmitted => StatusCode::CONFLICT,
        ErrorKind::CarrierUnavailable | ErrorKind::NoTracking => StatusCode::BAD_GATEWAY,
        ErrorKind::Configuration => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Invalid(errors) => {
                let body = json!({"error": errors.to_string(), "kind": ErrorKind::Validation.as_str(), "retryable": false});
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            Self::Orders(e) => {
                let kind = e.kind();
                if kind == ErrorKind::Internal {
                    tracing::error!(error = %e, "request failed");
                }
                let mut body = json!({"error": e.to_string(), "kind": kind.as_str(), "retryable": e.is_retryable()});
                if let OrdersError::AlreadySubmitted { tracking, .. } = &e {
                    body["tracking"] = json!(tracking.as_str());
                }
                (status_for(kind), Json(body)).into_response()
            }
        }
    }
}
