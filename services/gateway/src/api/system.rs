//! Operator endpoints outside tenant admission.
//!
//! Neither route takes a token: probes and dashboards call them directly.
use crate::api::error::{ApiError, api_internal};
use crate::api::types::{HealthStatus, SystemInfo};
use crate::app::AppState;
use axum::Json;
use axum::extract::State;

#[utoipa::path(
    get,
    path = "/v1/system/info",
    tag = "system",
    responses(
        (status = 200, description = "Gateway identity, storage backend and policy shape", body = SystemInfo)
    )
)]
pub(crate) async fn system_info(State(state): State<AppState>) -> Json<SystemInfo> {
    let policy = state.pipeline.policy();
    Json(SystemInfo {
        service: state.service_name.clone(),
        api_version: state.api_version.clone(),
        storage_backend: state.store.backend_name().to_string(),
        durable_storage: state.store.is_durable(),
        access_rules: policy.routes.len(),
        gated_features: policy
            .features
            .rules()
            .iter()
            .map(|rule| rule.feature.clone())
            .collect(),
    })
}

#[utoipa::path(
    get,
    path = "/v1/system/health",
    tag = "system",
    responses(
        (status = 200, description = "Tenant store reachable", body = HealthStatus),
        (status = 500, description = "Tenant store unavailable", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn system_health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, ApiError> {
    let backend = state.store.backend_name();
    if let Err(err) = state.store.health_check().await {
        tracing::warn!(backend, error = %err, "health check failed");
        return Err(api_internal("tenant store unavailable", &err));
    }
    Ok(Json(HealthStatus {
        status: "ok".to_string(),
        storage_backend: backend.to_string(),
    }))
}
