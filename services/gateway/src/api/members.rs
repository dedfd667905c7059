//! Membership management for the acting tenant.
//!
//! # Key invariants and assumptions
//! - Memberships are never deleted; `removed` is terminal.
//! - An owner cannot be demoted or removed here.
//! - Callers cannot grant a role senior to their own, or explicit
//!   permissions they do not hold themselves.
//! - New members are never primary; the seat quota was checked at admission.
use crate::api::error::{
    ApiError, api_conflict, api_forbidden, api_internal, api_not_found, api_validation_error,
};
use crate::api::types::{MemberCreateRequest, MemberListResponse, MemberPatchRequest};
use crate::app::AppState;
use crate::context::TenantContext;
use crate::model::{MembershipStatus, MembershipUpdate, TenantMembership};
use crate::store::StoreError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use tenantgate_authz::{PermissionSet, Role, validate_permission};

#[utoipa::path(
    get,
    path = "/v1/members",
    tag = "members",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Memberships of the acting tenant", body = MemberListResponse),
        (status = 403, description = "Not entitled to the tenant", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn list_members(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
) -> Result<Json<MemberListResponse>, ApiError> {
    let items = state
        .store
        .list_tenant_memberships(&context.tenant_id)
        .await
        .map_err(|err| api_internal("failed to list members", &err))?;
    Ok(Json(MemberListResponse {
        tenant_id: context.tenant_id,
        items,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/tenants/{tenant_id}/members",
    tag = "members",
    security(("bearer" = [])),
    params(("tenant_id" = String, Path, description = "Tenant identifier")),
    responses(
        (status = 200, description = "Memberships of the tenant", body = MemberListResponse),
        (status = 403, description = "Not entitled to the tenant", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Tenant not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn list_tenant_members(
    state: State<AppState>,
    Path(tenant_id): Path<String>,
    Extension(context): Extension<TenantContext>,
) -> Result<Json<MemberListResponse>, ApiError> {
    // Admission already pinned the context to the path tenant.
    if tenant_id != context.tenant_id {
        return Err(api_forbidden("tenant mismatch"));
    }
    list_members(state, Extension(context)).await
}

#[utoipa::path(
    post,
    path = "/v1/members",
    tag = "members",
    security(("bearer" = [])),
    request_body = MemberCreateRequest,
    responses(
        (status = 201, description = "Membership created", body = TenantMembership),
        (status = 400, description = "Invalid request", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Forbidden or seat quota exceeded", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Membership already exists", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn add_member(
    State(state): State<AppState>,
    Extension(context): Extension<TenantContext>,
    Json(request): Json<MemberCreateRequest>,
) -> Result<(StatusCode, Json<TenantMembership>), ApiError> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(api_validation_error("user_id must not be empty"));
    }
    ensure_may_grant_role(&context, request.role)?;
    for permission in &request.permissions {
        validate_permission(permission)
            .map_err(|err| api_validation_error(&err.to_string()))?;
        if !context.permissions.allows(permission) {
            return Err(api_forbidden(&format!(
                "cannot grant {permission} without holding it"
            )));
        }
    }

    let membership = TenantMembership {
        user_id: user_id.to_string(),
        tenant_id: context.tenant_id.clone(),
        role: request.role,
        permissions: PermissionSet::from_iter(request.permissions),
        is_primary: false,
        status: MembershipStatus::Active,
        joined_at: Utc::now(),
    };
    match state.store.create_membership_if_absent(membership.clone()).await {
        Ok(true) => {
            tracing::info!(
                tenant_id = %context.tenant_id,
                user_id = %membership.user_id,
                role = %membership.role,
                added_by = %context.user_id,
                "member added"
            );
            Ok((StatusCode::CREATED, Json(membership)))
        }
        Ok(false) => Err(api_conflict("membership_exists", "membership already exists")),
        Err(StoreError::Conflict(_)) => {
            Err(api_conflict("membership_exists", "membership already exists"))
        }
        Err(err) => Err(api_internal("failed to add member", &err)),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/members/{user_id}",
    tag = "members",
    security(("bearer" = [])),
    params(("user_id" = String, Path, description = "Member user identifier")),
    request_body = MemberPatchRequest,
    responses(
        (status = 200, description = "Membership updated", body = TenantMembership),
        (status = 400, description = "Empty update", body = crate::api::types::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::api::types::ErrorResponse),
        (status = 404, description = "Membership not found", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Membership removed", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn update_member(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(context): Extension<TenantContext>,
    Json(request): Json<MemberPatchRequest>,
) -> Result<Json<TenantMembership>, ApiError> {
    let update = MembershipUpdate {
        role: request.role,
        status: request.status,
    };
    if update.is_empty() {
        return Err(api_validation_error("nothing to update"));
    }
    let target = state
        .store
        .get_membership(&user_id, &context.tenant_id)
        .await
        .map_err(|err| api_internal("failed to load membership", &err))?
        .ok_or_else(|| api_not_found("membership not found"))?;

    let demotes = update.role.is_some_and(|role| role != Role::Owner);
    let deactivates = update
        .status
        .is_some_and(|status| status != MembershipStatus::Active);
    if target.role == Role::Owner && (demotes || deactivates) {
        return Err(api_forbidden("an owner cannot be demoted or removed"));
    }
    if let Some(role) = update.role {
        ensure_may_grant_role(&context, role)?;
    }

    match state
        .store
        .update_membership(&user_id, &context.tenant_id, update)
        .await
    {
        Ok(membership) => {
            tracing::info!(
                tenant_id = %context.tenant_id,
                user_id = %membership.user_id,
                role = %membership.role,
                status = %membership.status,
                updated_by = %context.user_id,
                "member updated"
            );
            Ok(Json(membership))
        }
        Err(StoreError::Conflict(_)) => Err(api_conflict(
            "membership_removed",
            "removed memberships cannot be changed",
        )),
        Err(StoreError::NotFound(_)) => Err(api_not_found("membership not found")),
        Err(err) => Err(api_internal("failed to update member", &err)),
    }
}

fn ensure_may_grant_role(context: &TenantContext, role: Role) -> Result<(), ApiError> {
    if context.role.satisfies(role) {
        return Ok(());
    }
    Err(api_forbidden(&format!(
        "cannot grant the {role} role as {}",
        context.role
    )))
}
