//! Usage analytics for the acting tenant (a premium feature).
use crate::api::error::{ApiError, api_internal};
use crate::api::types::UsageResponse;
use crate::app::AppState;
use crate::context::TenantContext;
use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;

#[utoipa::path(
    get,
    path = "/v1/usage",
    tag = "usage",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Unexpired usage totals by metric type", body = UsageResponse),
        (status = 402, description = "Plan upgrade required", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_usage(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
) -> Result<Json<UsageResponse>, ApiError> {
    let totals = state
        .store
        .usage_totals(&context.tenant_id, Utc::now())
        .await
        .map_err(|err| api_internal("failed to load usage", &err))?;
    Ok(Json(UsageResponse {
        tenant_id: context.tenant_id,
        totals,
    }))
}
