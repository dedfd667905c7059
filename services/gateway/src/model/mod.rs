//! Gateway data model.
//!
//! # Purpose
//! Organizations, memberships and usage metrics as stored and as exposed
//! through the HTTP API.
mod tenant;
mod usage;

pub use tenant::{
    MembershipStatus, MembershipUpdate, Organization, OrganizationSettings, OrganizationStatus,
    TenantMembership,
};
pub use usage::{MetricType, UsageMetric, UsageTotal};
