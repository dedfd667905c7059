//! Authorization primitives shared by the tenant gateway.
//!
//! # Purpose
//! Holds the I/O-free half of request authorization: permission matching,
//! the role table, the route registry, plan tiers with their premium-feature
//! table, and quota arithmetic.
//!
//! # How it fits
//! The gateway service verifies tokens and resolves tenants, then asks this
//! crate whether the resolved membership may perform the requested operation.
//! Nothing here touches the network or a store, so every decision is
//! reproducible in a unit test.
//!
//! # Key invariants
//! - Permission strings are `*` or `action:resource`; the only wildcard forms
//!   are the super-user `*` and a whole-resource `action:*`.
//! - Roles are totally ordered (`owner > admin > member > viewer`) and the
//!   role table is monotone: a senior role holds every permission of a junior.
//! - Plans are totally ordered (`free < basic < pro < enterprise`).
//! - Registries are validated once at startup and never mutated afterwards.
//!
//! # Examples
//! ```rust
//! use tenantgate_authz::{PermissionSet, has_permission};
//!
//! let granted = PermissionSet::from_iter(["read:*"]);
//! assert!(has_permission(&granted, "read:projects"));
//! assert!(!has_permission(&granted, "write:projects"));
//! ```
//!
//! # Common pitfalls
//! - Building a [`RouteRegistry`] per request; it is meant to be built once and shared.
//! - Treating `read:proj*` as a glob; partial wildcards never match.

mod errors;
mod permission;
mod plan;
mod policy;
mod quota;
mod role;
mod route;

pub use errors::{AuthzError, AuthzResult};
pub use permission::{PermissionSet, has_permission, validate_permission};
pub use plan::{FeatureDenied, FeatureRule, FeatureTable, Plan, check_feature_access};
pub use policy::{AccessPolicy, AccessPolicyDocument};
pub use quota::{QuotaDenied, QuotaKind, check_quota_limit};
pub use role::{Role, RoleTable};
pub use route::{QuotaRequirement, RouteMatch, RouteRegistry, RouteRule};
