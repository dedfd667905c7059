//! Tenant resolution and default-tenant provisioning.
//!
//! # Purpose
//! Decide which tenant a verified caller is acting in, check that the caller
//! may act there, and create a personal tenant for brand-new users.
//!
//! # Key invariants
//! - Hint precedence: explicit request hint (header or path) > token claim >
//!   the caller's primary membership.
//! - Provisioning is keyed on a tenant id derived from the user id, so retries
//!   and concurrent first requests converge on one organization and one
//!   membership.
//! - Suspended and trial-expired organizations only admit administrative
//!   routes.
mod provision;
mod resolver;

pub use provision::{PERSONAL_MAX_STORAGE_BYTES, PERSONAL_MAX_USERS, personal_tenant_id};
pub use resolver::{
    ForbiddenReason, ResolveError, ResolvedTenant, RouteAccess, TenantResolver, explicit_hint,
};
