//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Keeps error bodies uniform across the admission middleware and the
//! handlers behind it.
//!
//! # Key invariants and assumptions
//! - Every body has a stable `code` and a human-readable `message`.
//! - Status codes match the code's category.
//!
//! # Security considerations
//! - Store failures are logged server-side; the body carries a generic message.
use crate::api::types::{ErrorResponse, UpgradeHint};
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use axum::response::IntoResponse;

/// Structured API error returned by handlers.
///
/// # Example
/// ```rust
/// use axum::http::StatusCode;
/// use gateway::api::error::api_not_found;
///
/// let err = api_not_found("tenant not found");
/// assert_eq!(err.status, StatusCode::NOT_FOUND);
/// assert_eq!(err.body.code, "not_found");
/// ```
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
    /// Rendered as `Retry-After` when set.
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code: code.to_string(),
                message: message.to_string(),
                request_id: None,
                upgrade: None,
            },
            retry_after_secs: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.body.request_id = request_id;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            response.headers_mut().insert(RETRY_AFTER, secs.into());
        }
        response
    }
}

pub fn api_unauthorized(message: &str) -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
}

pub fn api_forbidden(message: &str) -> ApiError {
    ApiError::new(StatusCode::FORBIDDEN, "forbidden", message)
}

/// 402 with the feature and plans an upgrade prompt needs.
pub fn api_payment_required(message: &str, upgrade: UpgradeHint) -> ApiError {
    let mut error = ApiError::new(StatusCode::PAYMENT_REQUIRED, "payment_required", message);
    error.body.upgrade = Some(upgrade);
    error
}

pub fn api_not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "not_found", message)
}

/// Quota denials share 403 with `forbidden` but keep their own code.
pub fn api_quota_exceeded(message: &str) -> ApiError {
    ApiError::new(StatusCode::FORBIDDEN, "quota_exceeded", message)
}

pub fn api_tenant_error(message: &str) -> ApiError {
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "tenant_error", message)
}

pub fn api_unavailable(message: &str, retry_after_secs: u64) -> ApiError {
    let mut error = ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message);
    error.retry_after_secs = Some(retry_after_secs);
    error
}

pub fn api_conflict(code: &str, message: &str) -> ApiError {
    ApiError::new(StatusCode::CONFLICT, code, message)
}

pub fn api_validation_error(message: &str) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "validation_error", message)
}

/// Build a 500 from a store error.
///
/// Logs the store error and returns a generic internal error response.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "gateway storage error");
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}
