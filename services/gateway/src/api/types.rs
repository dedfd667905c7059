//! HTTP API request/response types.
//!
//! # Purpose
//! Payload shapes for the gateway REST API and OpenAPI schema generation.
use crate::model::{MembershipStatus, TenantMembership, UsageTotal};
use serde::{Deserialize, Serialize};
use tenantgate_authz::Role;
use utoipa::ToSchema;

/// Gateway identity plus the shape of the loaded access policy.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct SystemInfo {
    pub service: String,
    pub api_version: String,
    pub storage_backend: String,
    pub durable_storage: bool,
    /// Method + path rules in the route registry.
    pub access_rules: usize,
    /// Premium features gated by plan.
    pub gated_features: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub storage_backend: String,
}

/// What an upgrade prompt needs: the blocked feature and both plan tiers.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct UpgradeHint {
    pub feature: String,
    pub current_plan: String,
    pub required_plan: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade: Option<UpgradeHint>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct MemberListResponse {
    pub tenant_id: String,
    pub items: Vec<TenantMembership>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct MemberCreateRequest {
    pub user_id: String,
    #[serde(default = "default_member_role")]
    #[schema(value_type = String, example = "member")]
    pub role: Role,
    /// Explicit grants on top of the role table.
    #[serde(default)]
    pub permissions: Vec<String>,
}

fn default_member_role() -> Role {
    Role::Member
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Default)]
pub struct MemberPatchRequest {
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "admin")]
    pub role: Option<Role>,
    #[serde(default)]
    pub status: Option<MembershipStatus>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct FileUploadResponse {
    pub tenant_id: String,
    pub bytes: u64,
    /// Tenant storage counter after this upload.
    pub storage_used: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct UsageResponse {
    pub tenant_id: String,
    pub totals: Vec<UsageTotal>,
}
