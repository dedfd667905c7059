//! Organization (tenant) and membership records.
//!
//! # Purpose
//! Defines the persisted tenant state the resolver reads and the
//! membership-management handlers mutate.
//!
//! # Key invariants
//! - Organizations are never deleted, only suspended.
//! - Memberships are never deleted; `removed` is terminal.
//! - A user has at most one membership with `is_primary = true` (enforced by stores).
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tenantgate_authz::{PermissionSet, Plan, Role};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationStatus {
    Active,
    Trial,
    Suspended,
}

impl OrganizationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrganizationStatus::Active => "active",
            OrganizationStatus::Trial => "trial",
            OrganizationStatus::Suspended => "suspended",
        }
    }
}

impl FromStr for OrganizationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(OrganizationStatus::Active),
            "trial" => Ok(OrganizationStatus::Trial),
            "suspended" => Ok(OrganizationStatus::Suspended),
            other => Err(format!("unknown organization status {other}")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct OrganizationSettings {
    pub max_users: u64,
    pub max_storage_bytes: u64,
    /// Add-on features granted regardless of plan tier.
    #[serde(default)]
    pub features: BTreeSet<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Organization {
    pub tenant_id: String,
    pub name: String,
    #[schema(value_type = String, example = "free")]
    pub plan: Plan,
    pub status: OrganizationStatus,
    pub settings: OrganizationSettings,
    pub trial_ends_at: Option<DateTime<Utc>>,
}

impl Organization {
    pub fn is_suspended(&self) -> bool {
        self.status == OrganizationStatus::Suspended
    }

    /// A trial without an end date never expires.
    pub fn is_trial_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == OrganizationStatus::Trial
            && self.trial_ends_at.is_some_and(|ends_at| ends_at <= now)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Suspended,
    Removed,
}

impl MembershipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Suspended => "suspended",
            MembershipStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(MembershipStatus::Active),
            "suspended" => Ok(MembershipStatus::Suspended),
            "removed" => Ok(MembershipStatus::Removed),
            other => Err(format!("unknown membership status {other}")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct TenantMembership {
    pub user_id: String,
    pub tenant_id: String,
    #[schema(value_type = String, example = "member")]
    pub role: Role,
    /// Explicit grants on top of the role table.
    #[schema(value_type = Vec<String>)]
    pub permissions: PermissionSet,
    pub is_primary: bool,
    pub status: MembershipStatus,
    pub joined_at: DateTime<Utc>,
}

impl TenantMembership {
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }

    /// Removed memberships no longer occupy a seat.
    pub fn occupies_seat(&self) -> bool {
        self.status != MembershipStatus::Removed
    }
}

/// Partial update applied by membership management.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipUpdate {
    pub role: Option<Role>,
    pub status: Option<MembershipStatus>,
}

impl MembershipUpdate {
    pub fn is_empty(&self) -> bool {
        self.role.is_none() && self.status.is_none()
    }

    pub fn apply(&self, membership: &mut TenantMembership) {
        if let Some(role) = self.role {
            membership.role = role;
        }
        if let Some(status) = self.status {
            membership.status = status;
        }
    }
}
