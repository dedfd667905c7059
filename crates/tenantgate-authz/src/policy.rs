//! Startup-loaded access policy: roles, routes and premium features together.
//!
//! The serializable [`AccessPolicyDocument`] is what operators write (YAML in
//! the gateway); [`AccessPolicy`] is the validated, immutable form shared by
//! every request.
use crate::{
    AuthzError, AuthzResult, FeatureRule, FeatureTable, PermissionSet, Role, RoleTable,
    RouteRegistry, RouteRule,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessPolicyDocument {
    /// Role name → granted permissions.
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub routes: Vec<RouteRule>,
    #[serde(default)]
    pub features: Vec<FeatureRule>,
}

#[derive(Debug, Clone)]
pub struct AccessPolicy {
    pub roles: RoleTable,
    pub routes: RouteRegistry,
    pub features: FeatureTable,
}

impl AccessPolicy {
    /// Validate a document into a policy.
    ///
    /// # Errors
    /// - Any table-level validation failure (malformed permission, duplicate
    ///   route, free-tier feature, non-monotone roles).
    /// - A route whose `min_role` does not itself hold the route's permission;
    ///   such a route would deny the minimum role on permission grounds.
    pub fn from_document(document: AccessPolicyDocument) -> AuthzResult<Self> {
        let mut grants = BTreeMap::new();
        for (name, permissions) in document.roles {
            let role: Role = name.parse()?;
            grants.insert(role, PermissionSet::from_iter(permissions));
        }
        let roles = RoleTable::new(grants)?;
        let routes = RouteRegistry::new(document.routes)?;
        for rule in routes.rules() {
            if let (Some(min_role), Some(permission)) = (rule.min_role, &rule.permission)
                && !roles.permissions_for(min_role).allows(permission)
            {
                return Err(AuthzError::InvalidRoute {
                    route: rule.describe(),
                    reason: format!("role {min_role} does not hold {permission}"),
                });
            }
        }
        let features = FeatureTable::new(document.features)?;
        Ok(Self {
            roles,
            routes,
            features,
        })
    }
}
