//! Permission strings and wildcard matching.
//!
//! # Purpose
//! Answers "does this granted set cover the required permission?" for the
//! request pipeline and the membership-management handlers.
//!
//! # Key invariants
//! - Matching is total: any pair of strings yields `true` or `false`, never an error.
//! - Rules apply in order: `*` grants everything, then exact match, then
//!   `action:*` for a required `action:resource`.
//! - No other wildcard forms exist. `*:projects`, `read:proj*` and globbing
//!   inside either half never match anything but themselves.
//!
//! # Examples
//! ```rust
//! use tenantgate_authz::{PermissionSet, has_permission};
//!
//! assert!(has_permission(&PermissionSet::from_iter(["*"]), "write:projects"));
//! assert!(!has_permission(&PermissionSet::new(), "read:projects"));
//! ```
use crate::{AuthzError, AuthzResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const SUPER_USER: &str = "*";

/// Set of granted permission strings.
///
/// Backed by a `BTreeSet` so serialized output is stable and duplicates collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, permission: impl Into<String>) -> bool {
        self.0.insert(permission.into())
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    /// Returns true if this set grants `required`.
    pub fn allows(&self, required: &str) -> bool {
        has_permission(self, required)
    }

    /// Union of two sets; used to merge role grants with explicit membership grants.
    pub fn union(&self, other: &PermissionSet) -> PermissionSet {
        PermissionSet(self.0.union(&other.0).cloned().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_super_user(&self) -> bool {
        self.0.contains(SUPER_USER)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0.into_iter().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Check whether `granted` covers `required`.
///
/// # Returns
/// - `true` when `granted` holds `*`, holds `required` verbatim, or holds
///   `action:*` where `required` is `action:<anything>`.
/// - `false` otherwise, including for an empty set.
pub fn has_permission(granted: &PermissionSet, required: &str) -> bool {
    if granted.contains(SUPER_USER) || granted.contains(required) {
        return true;
    }
    match required.split_once(':') {
        Some((action, _)) if !action.is_empty() => granted.contains(&format!("{action}:*")),
        _ => false,
    }
}

/// Validate the shape of a permission string before it enters a table or store.
///
/// Accepted: `*`, `action:resource`, `action:*`. The action may not contain
/// `*` and the resource is either exactly `*` or wildcard-free.
pub fn validate_permission(permission: &str) -> AuthzResult<()> {
    if permission == SUPER_USER {
        return Ok(());
    }
    let invalid = || AuthzError::InvalidPermission(permission.to_string());
    let (action, resource) = permission.split_once(':').ok_or_else(invalid)?;
    if action.is_empty() || resource.is_empty() {
        return Err(invalid());
    }
    if action.contains('*') || action.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    if resource != SUPER_USER && (resource.contains('*') || resource.chars().any(char::is_whitespace))
    {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> PermissionSet {
        PermissionSet::from_iter(items.iter().copied())
    }

    #[test]
    fn super_user_grants_everything() {
        let granted = set(&["*"]);
        for required in ["read:projects", "write:files", "*", "", "no-colon", ":"] {
            assert!(has_permission(&granted, required), "{required}");
        }
    }

    #[test]
    fn exact_match_grants() {
        let granted = set(&["write:projects"]);
        assert!(has_permission(&granted, "write:projects"));
        assert!(!has_permission(&granted, "write:files"));
    }

    #[test]
    fn action_wildcard_grants_same_action_only() {
        let granted = set(&["read:*"]);
        assert!(has_permission(&granted, "read:projects"));
        assert!(has_permission(&granted, "read:members"));
        assert!(!has_permission(&granted, "write:projects"));
    }

    #[test]
    fn empty_set_grants_nothing() {
        let granted = PermissionSet::new();
        for required in ["read:projects", "*", "", "read:*"] {
            assert!(!has_permission(&granted, required), "{required}");
        }
    }

    #[test]
    fn unsupported_wildcard_forms_do_not_match() {
        assert!(!has_permission(&set(&["*:projects"]), "read:projects"));
        assert!(!has_permission(&set(&["read:proj*"]), "read:projects"));
        assert!(!has_permission(&set(&["re*:projects"]), "read:projects"));
    }

    #[test]
    fn malformed_required_strings_are_total() {
        let granted = set(&["read:*", ":*"]);
        assert!(!has_permission(&granted, "read"));
        assert!(!has_permission(&granted, ":projects"));
        assert!(!has_permission(&granted, ""));
        assert!(has_permission(&granted, "read:a:b"));
    }

    #[test]
    fn union_merges_grants() {
        let merged = set(&["read:*"]).union(&set(&["write:files"]));
        assert_eq!(merged.len(), 2);
        assert!(merged.allows("write:files"));
        assert!(!merged.is_super_user());
    }

    #[test]
    fn validate_permission_accepts_supported_forms() {
        for permission in ["*", "read:projects", "read:*", "manage:members"] {
            assert!(validate_permission(permission).is_ok(), "{permission}");
        }
    }

    #[test]
    fn validate_permission_rejects_malformed() {
        for permission in [
            "", "read", "read:", ":projects", "*:projects", "read:proj*", "read :x",
        ] {
            assert!(validate_permission(permission).is_err(), "{permission}");
        }
    }

    #[test]
    fn permission_set_serializes_as_sorted_array() {
        let granted = set(&["write:files", "read:*"]);
        let json = serde_json::to_value(&granted).expect("serialize");
        assert_eq!(json, serde_json::json!(["read:*", "write:files"]));
    }
}
