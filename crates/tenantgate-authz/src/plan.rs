//! Subscription plans and the premium-feature table.
//!
//! # Purpose
//! Maps path prefixes to named premium features and the minimum plan tier
//! allowed to use them. A denial here is a billing decision, not a role
//! decision, so it carries enough detail for an upgrade prompt.
//!
//! # Key invariants
//! - `Plan` derives `Ord`: `free < basic < pro < enterprise`.
//! - No feature may require `free`; every entry in the table is premium, so
//!   a `free` organization is denied every listed feature.
//! - Prefixes match on whole path segments: `/v1/usage` covers `/v1/usage`
//!   and `/v1/usage/daily` but not `/v1/usages`.
use crate::{AuthzError, AuthzResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl Plan {
    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Basic => "basic",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "free" => Ok(Plan::Free),
            "basic" => Ok(Plan::Basic),
            "pro" => Ok(Plan::Pro),
            "enterprise" => Ok(Plan::Enterprise),
            other => Err(AuthzError::UnknownPlan(other.to_string())),
        }
    }
}

/// One premium feature: a path prefix and the lowest plan that may use it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRule {
    pub feature: String,
    pub path_prefix: String,
    pub min_plan: Plan,
}

impl FeatureRule {
    fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.path_prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// Returned when a plan is below a feature's minimum tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureDenied {
    pub feature: String,
    pub current_plan: Plan,
    pub required_plan: Plan,
}

impl fmt::Display for FeatureDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "feature {} requires the {} plan (current: {})",
            self.feature, self.required_plan, self.current_plan
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureTable {
    rules: Vec<FeatureRule>,
}

impl FeatureTable {
    pub fn new(rules: Vec<FeatureRule>) -> AuthzResult<Self> {
        let mut names = HashSet::new();
        let mut prefixes = HashSet::new();
        for rule in &rules {
            let invalid = |reason: &str| AuthzError::InvalidFeature {
                feature: rule.feature.clone(),
                reason: reason.to_string(),
            };
            if rule.feature.trim().is_empty() {
                return Err(invalid("empty feature name"));
            }
            if !rule.path_prefix.starts_with('/') || rule.path_prefix.ends_with('/') {
                return Err(invalid("path prefix must start with '/' and not end with one"));
            }
            if rule.min_plan == Plan::Free {
                return Err(invalid("premium features cannot require the free plan"));
            }
            if !names.insert(rule.feature.as_str()) {
                return Err(invalid("duplicate feature name"));
            }
            if !prefixes.insert(rule.path_prefix.as_str()) {
                return Err(invalid("duplicate path prefix"));
            }
        }
        Ok(Self { rules })
    }

    /// The most specific feature covering `path`, if any.
    pub fn feature_for_path(&self, path: &str) -> Option<&FeatureRule> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(path))
            .max_by_key(|rule| rule.path_prefix.len())
    }

    pub fn rules(&self) -> &[FeatureRule] {
        &self.rules
    }
}

/// Check a plan against a feature's minimum tier.
pub fn check_feature_access(plan: Plan, feature: &FeatureRule) -> Result<(), FeatureDenied> {
    if plan >= feature.min_plan {
        return Ok(());
    }
    Err(FeatureDenied {
        feature: feature.feature.clone(),
        current_plan: plan,
        required_plan: feature.min_plan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(feature: &str, prefix: &str, min_plan: Plan) -> FeatureRule {
        FeatureRule {
            feature: feature.to_string(),
            path_prefix: prefix.to_string(),
            min_plan,
        }
    }

    fn table() -> FeatureTable {
        FeatureTable::new(vec![
            rule("analytics", "/v1/usage", Plan::Pro),
            rule("analytics_export", "/v1/usage/export", Plan::Enterprise),
        ])
        .expect("table")
    }

    #[test]
    fn prefix_matches_whole_segments() {
        let table = table();
        assert_eq!(
            table.feature_for_path("/v1/usage").map(|r| r.feature.as_str()),
            Some("analytics")
        );
        assert_eq!(
            table.feature_for_path("/v1/usage/daily").map(|r| r.feature.as_str()),
            Some("analytics")
        );
        assert!(table.feature_for_path("/v1/usages").is_none());
        assert!(table.feature_for_path("/v1/members").is_none());
    }

    #[test]
    fn longest_prefix_wins() {
        let table = table();
        let rule = table.feature_for_path("/v1/usage/export/csv").expect("rule");
        assert_eq!(rule.feature, "analytics_export");
    }

    #[test]
    fn free_plan_is_denied_every_feature() {
        for rule in table().rules() {
            let denied = check_feature_access(Plan::Free, rule).unwrap_err();
            assert_eq!(denied.current_plan, Plan::Free);
            assert_eq!(denied.required_plan, rule.min_plan);
        }
    }

    #[test]
    fn plans_at_or_above_minimum_are_allowed() {
        let analytics = rule("analytics", "/v1/usage", Plan::Pro);
        assert!(check_feature_access(Plan::Basic, &analytics).is_err());
        assert!(check_feature_access(Plan::Pro, &analytics).is_ok());
        assert!(check_feature_access(Plan::Enterprise, &analytics).is_ok());
    }

    #[test]
    fn free_minimum_is_rejected() {
        let err = FeatureTable::new(vec![rule("x", "/v1/x", Plan::Free)]).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidFeature { .. }));
    }

    #[test]
    fn duplicate_prefix_is_rejected() {
        let err = FeatureTable::new(vec![
            rule("a", "/v1/x", Plan::Pro),
            rule("b", "/v1/x", Plan::Basic),
        ])
        .unwrap_err();
        assert!(matches!(err, AuthzError::InvalidFeature { .. }));
    }

    #[test]
    fn plan_parses_and_orders() {
        assert_eq!("pro".parse::<Plan>(), Ok(Plan::Pro));
        assert!("gold".parse::<Plan>().is_err());
        assert!(Plan::Free < Plan::Basic && Plan::Pro < Plan::Enterprise);
    }
}
