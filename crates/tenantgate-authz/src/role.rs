//! Membership roles and the role→permission table.
//!
//! # Key invariants
//! - `Role` derives `Ord` in seniority order, so `Role::Owner > Role::Viewer`.
//! - A validated [`RoleTable`] is monotone: every permission held by a junior
//!   role is also granted (directly or through a wildcard) to every senior role.
//!   Route checks that compare seniority therefore never deny a senior caller
//!   on role grounds alone.
use crate::{AuthzError, AuthzResult, PermissionSet, validate_permission};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Member,
    Admin,
    Owner,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Viewer, Role::Member, Role::Admin, Role::Owner];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Member => "member",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }

    /// True if this role is `minimum` or senior to it.
    pub fn satisfies(self, minimum: Role) -> bool {
        self >= minimum
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "viewer" => Ok(Role::Viewer),
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            other => Err(AuthzError::UnknownRole(other.to_string())),
        }
    }
}

/// Static mapping from role to granted permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTable {
    grants: BTreeMap<Role, PermissionSet>,
}

impl RoleTable {
    /// Build and validate a table. Roles missing from `grants` hold no permissions.
    pub fn new(grants: BTreeMap<Role, PermissionSet>) -> AuthzResult<Self> {
        for permissions in grants.values() {
            for permission in permissions.iter() {
                validate_permission(permission)?;
            }
        }
        let table = Self { grants };
        table.ensure_monotone()?;
        Ok(table)
    }

    pub fn permissions_for(&self, role: Role) -> PermissionSet {
        self.grants.get(&role).cloned().unwrap_or_default()
    }

    /// Role grants merged with the explicit grants stored on a membership.
    pub fn effective_permissions(&self, role: Role, explicit: &PermissionSet) -> PermissionSet {
        match self.grants.get(&role) {
            Some(granted) => granted.union(explicit),
            None => explicit.clone(),
        }
    }

    fn ensure_monotone(&self) -> AuthzResult<()> {
        for senior in Role::ALL {
            let senior_grants = self.permissions_for(senior);
            for junior in Role::ALL.into_iter().filter(|junior| *junior < senior) {
                for permission in self.permissions_for(junior).iter() {
                    if !senior_grants.allows(permission) {
                        return Err(AuthzError::NonMonotoneRoles {
                            senior: senior.to_string(),
                            junior: junior.to_string(),
                            permission: permission.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
