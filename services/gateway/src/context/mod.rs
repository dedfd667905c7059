//! Request admission: from bearer token to a read-only tenant context.
//!
//! # Purpose
//! Runs every protected request through the admission state machine and
//! hands downstream handlers a [`TenantContext`].
//!
//! # State machine
//! `Unauthenticated -> TokenVerified -> TenantResolved -> Authorized -> Complete`,
//! with `Rejected` reachable from every state. Cheap checks run first:
//! token shape and signature before any store read, role checks before
//! quota reads.
//!
//! # Security model and threat assumptions
//! - Token failures collapse into one `unauthorized` response.
//! - Internal failure detail is logged, never rendered.
//! - A slow key set or tenant store fails the request closed.
mod middleware;
mod pipeline;
mod rejection;

use crate::model::OrganizationSettings;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tenantgate_authz::{PermissionSet, Plan, Role};
use utoipa::ToSchema;

pub use middleware::{REQUEST_ID_HEADER, require_tenant_context};
pub use pipeline::{ContextBuilder, PipelineTimeouts, TENANT_HEADER};
pub use rejection::Rejection;

/// Lifetime of the token that admitted the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TokenMeta {
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Who is acting, in which tenant, with what rights.
///
/// Attached to request extensions by [`require_tenant_context`]; handlers
/// read it and never change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TenantContext {
    pub user_id: String,
    pub tenant_id: String,
    #[schema(value_type = String, example = "member")]
    pub role: Role,
    /// Role grants plus the membership's explicit grants.
    #[schema(value_type = Vec<String>)]
    pub permissions: PermissionSet,
    #[schema(value_type = String, example = "free")]
    pub organization_plan: Plan,
    pub organization_settings: OrganizationSettings,
    pub is_primary_tenant: bool,
    pub token: TokenMeta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Unauthenticated,
    TokenVerified,
    TenantResolved,
    Authorized,
    Complete,
    Rejected,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Unauthenticated => "unauthenticated",
            PipelineStage::TokenVerified => "token_verified",
            PipelineStage::TenantResolved => "tenant_resolved",
            PipelineStage::Authorized => "authorized",
            PipelineStage::Complete => "complete",
            PipelineStage::Rejected => "rejected",
        }
    }
}
