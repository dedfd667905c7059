use crate::api::error::{
    ApiError, api_forbidden, api_not_found, api_payment_required, api_quota_exceeded,
    api_tenant_error, api_unauthorized, api_unavailable,
};
use crate::api::types::UpgradeHint;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tenantgate_authz::{FeatureDenied, QuotaDenied};

const UNAVAILABLE_RETRY_AFTER_SECS: u64 = 1;

/// Terminal admission outcome, in the external error taxonomy.
///
/// Variants carry only what may be shown to the caller; internal causes are
/// logged where the rejection is produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("invalid or missing credentials")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("upgrade required: {0}")]
    PaymentRequired(FeatureDenied),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    QuotaExceeded(QuotaDenied),
    #[error("tenant resolution failed")]
    TenantError,
    #[error("authorization temporarily unavailable")]
    Unavailable,
}

impl Rejection {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::Unauthorized => "unauthorized",
            Rejection::Forbidden(_) => "forbidden",
            Rejection::PaymentRequired(_) => "payment_required",
            Rejection::NotFound(_) => "not_found",
            Rejection::QuotaExceeded(_) => "quota_exceeded",
            Rejection::TenantError => "tenant_error",
            Rejection::Unavailable => "unavailable",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Unauthorized => StatusCode::UNAUTHORIZED,
            Rejection::Forbidden(_) | Rejection::QuotaExceeded(_) => StatusCode::FORBIDDEN,
            Rejection::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            Rejection::NotFound(_) => StatusCode::NOT_FOUND,
            Rejection::TenantError => StatusCode::INTERNAL_SERVER_ERROR,
            Rejection::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn into_api_error(self, request_id: Option<String>) -> ApiError {
        let message = self.to_string();
        let error = match self {
            Rejection::Unauthorized => api_unauthorized(&message),
            Rejection::Forbidden(_) => api_forbidden(&message),
            Rejection::PaymentRequired(denied) => api_payment_required(
                &message,
                UpgradeHint {
                    feature: denied.feature,
                    current_plan: denied.current_plan.to_string(),
                    required_plan: denied.required_plan.to_string(),
                },
            ),
            Rejection::NotFound(_) => api_not_found(&message),
            Rejection::QuotaExceeded(_) => api_quota_exceeded(&message),
            Rejection::TenantError => api_tenant_error(&message),
            Rejection::Unavailable => api_unavailable(&message, UNAVAILABLE_RETRY_AFTER_SECS),
        };
        error.with_request_id(request_id)
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> axum::response::Response {
        self.into_api_error(None).into_response()
    }
}
