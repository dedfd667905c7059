//! Echo of the admitted request context.
use crate::context::TenantContext;
use axum::{Extension, Json};

#[utoipa::path(
    get,
    path = "/v1/context",
    tag = "context",
    security(("bearer" = [])),
    params(("X-Tenant-Id" = Option<String>, Header, description = "Acting tenant")),
    responses(
        (status = 200, description = "Resolved tenant context", body = TenantContext),
        (status = 401, description = "Missing or invalid token", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Not entitled to the tenant", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn current_context(
    Extension(context): Extension<TenantContext>,
) -> Json<TenantContext> {
    Json(context)
}
