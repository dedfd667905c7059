//! Startup loading of the access policy (roles, routes, premium features).
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tenantgate_authz::{AccessPolicy, AccessPolicyDocument};

const DEFAULT_POLICY: &str = include_str!("../policy/default.yaml");

/// Loads and validates the policy at `path`, or the built-in one when unset.
pub fn load_access_policy(path: Option<&Path>) -> anyhow::Result<Arc<AccessPolicy>> {
    let contents = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("read access policy {}", path.display()))?,
        None => DEFAULT_POLICY.to_string(),
    };
    let policy = parse_access_policy(&contents)?;
    tracing::info!(
        routes = policy.routes.len(),
        features = policy.features.rules().len(),
        custom = path.is_some(),
        "access policy loaded"
    );
    Ok(Arc::new(policy))
}

pub fn parse_access_policy(contents: &str) -> anyhow::Result<AccessPolicy> {
    let document: AccessPolicyDocument =
        serde_yaml::from_str(contents).context("parse access policy yaml")?;
    AccessPolicy::from_document(document).context("validate access policy")
}
