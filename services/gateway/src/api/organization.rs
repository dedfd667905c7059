//! Organization read model for the acting tenant.
//!
//! This route is administrative: it stays reachable while the organization is
//! suspended or its trial has lapsed, so owners can see why.
use crate::api::error::{ApiError, api_internal, api_not_found};
use crate::app::AppState;
use crate::context::TenantContext;
use crate::model::Organization;
use axum::extract::State;
use axum::{Extension, Json};

#[utoipa::path(
    get,
    path = "/v1/organization",
    tag = "organization",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Acting tenant's organization", body = Organization),
        (status = 403, description = "Not entitled to the tenant", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Organization not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_organization(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
) -> Result<Json<Organization>, ApiError> {
    let organization = state
        .store
        .get_organization(&context.tenant_id)
        .await
        .map_err(|err| api_internal("failed to load organization", &err))?
        .ok_or_else(|| api_not_found("organization not found"))?;
    Ok(Json(organization))
}
