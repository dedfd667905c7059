//! Route → permission registry.
//!
//! # Purpose
//! Declares, for every guarded `METHOD /path`, the permission it requires, an
//! optional minimum role, an optional quota it consumes, and whether it is
//! administrative or sensitive. The registry is validated once at startup and
//! looked up per request.
//!
//! # Path patterns
//! Patterns are `/`-separated; a segment written `{name}` matches any single
//! non-empty segment. A `{tenant_id}` segment is captured and offered to the
//! tenant resolver as an explicit hint and must directly follow a literal
//! `tenants` segment. When several patterns match, the one with the most
//! literal segments wins.
//!
//! # Key invariants
//! - Lookups of unregistered routes return `None`; callers fail closed.
//! - Two rules with the same method and the same segment shape are rejected.
//! - Every `permission` passes [`validate_permission`].
use crate::{AuthzError, AuthzResult, QuotaKind, Role, validate_permission};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const TENANT_PARAM: &str = "tenant_id";
const TENANTS_SEGMENT: &str = "tenants";
const METHODS: [&str; 7] = ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"];

/// Quota consumed by a route.
///
/// `amount` is a fixed delta; when absent the request's declared body length
/// is used (uploads).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRequirement {
    pub kind: QuotaKind,
    #[serde(default)]
    pub amount: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub permission: Option<String>,
    #[serde(default)]
    pub min_role: Option<Role>,
    #[serde(default)]
    pub quota: Option<QuotaRequirement>,
    /// Reachable on suspended or trial-expired organizations.
    #[serde(default)]
    pub administrative: bool,
    /// Membership status details are masked on rejection.
    #[serde(default)]
    pub sensitive: bool,
}

impl RouteRule {
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    rule: RouteRule,
    segments: Vec<Segment>,
    literals: usize,
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub rule: &'a RouteRule,
    pub tenant_hint: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    routes: Vec<CompiledRoute>,
}

impl RouteRegistry {
    pub fn new(rules: Vec<RouteRule>) -> AuthzResult<Self> {
        let mut shapes = HashSet::new();
        let mut routes = Vec::with_capacity(rules.len());
        for mut rule in rules {
            rule.method = rule.method.to_ascii_uppercase();
            let route = rule.describe();
            if !METHODS.contains(&rule.method.as_str()) {
                return Err(AuthzError::InvalidRoute {
                    route,
                    reason: "unsupported method".to_string(),
                });
            }
            if let Some(permission) = &rule.permission {
                validate_permission(permission)?;
            }
            if matches!(&rule.quota, Some(QuotaRequirement { amount: Some(0), .. })) {
                return Err(AuthzError::InvalidRoute {
                    route,
                    reason: "quota amount must be positive".to_string(),
                });
            }
            let segments = compile(&rule.path).map_err(|reason| AuthzError::InvalidRoute {
                route: route.clone(),
                reason,
            })?;
            let shape = format!(
                "{} {:?}",
                rule.method,
                segments
                    .iter()
                    .map(|segment| match segment {
                        Segment::Literal(value) => Some(value.as_str()),
                        Segment::Param(_) => None,
                    })
                    .collect::<Vec<_>>()
            );
            if !shapes.insert(shape) {
                return Err(AuthzError::DuplicateRoute(route));
            }
            let literals = segments
                .iter()
                .filter(|segment| matches!(segment, Segment::Literal(_)))
                .count();
            routes.push(CompiledRoute {
                rule,
                segments,
                literals,
            });
        }
        // Most specific first so the first match is the best match.
        routes.sort_by(|a, b| b.literals.cmp(&a.literals));
        Ok(Self { routes })
    }

    pub fn lookup(&self, method: &str, path: &str) -> Option<RouteMatch<'_>> {
        let parts = split_path(path)?;
        self.routes
            .iter()
            .filter(|route| route.rule.method.eq_ignore_ascii_case(method))
            .find_map(|route| match_segments(&route.segments, &parts).map(|tenant_hint| {
                RouteMatch {
                    rule: &route.rule,
                    tenant_hint,
                }
            }))
    }

    pub fn rules(&self) -> impl Iterator<Item = &RouteRule> {
        self.routes.iter().map(|route| &route.rule)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn split_path(path: &str) -> Option<Vec<&str>> {
    let trimmed = path.strip_prefix('/')?;
    if trimmed.is_empty() {
        return Some(Vec::new());
    }
    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return None;
    }
    Some(parts)
}

fn compile(path: &str) -> Result<Vec<Segment>, String> {
    let parts = split_path(path)
        .ok_or_else(|| "path must start with '/' and have no empty segments".to_string())?;
    let mut params = HashSet::new();
    let mut segments = Vec::with_capacity(parts.len());
    for part in parts {
        if let Some(name) = part.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) {
            if name.is_empty() || name.contains(['{', '}']) {
                return Err(format!("invalid parameter segment {part}"));
            }
            if !params.insert(name) {
                return Err(format!("parameter {name} appears twice"));
            }
            if name == TENANT_PARAM
                && !matches!(segments.last(), Some(Segment::Literal(prev)) if prev == TENANTS_SEGMENT)
            {
                return Err(format!("{{{TENANT_PARAM}}} must follow /{TENANTS_SEGMENT}"));
            }
            segments.push(Segment::Param(name.to_string()));
        } else if part.contains(['{', '}']) {
            return Err(format!("parameters must span a whole segment: {part}"));
        } else {
            segments.push(Segment::Literal(part.to_string()));
        }
    }
    Ok(segments)
}

// Outer `None` means no match; inner is the captured tenant id, if the pattern has one.
#[allow(clippy::option_option)]
fn match_segments(segments: &[Segment], parts: &[&str]) -> Option<Option<String>> {
    if segments.len() != parts.len() {
        return None;
    }
    let mut tenant_hint = None;
    for (segment, part) in segments.iter().zip(parts) {
        match segment {
            Segment::Literal(value) if value == part => {}
            Segment::Literal(_) => return None,
            Segment::Param(name) => {
                if name == TENANT_PARAM {
                    tenant_hint = Some((*part).to_string());
                }
            }
        }
    }
    Some(tenant_hint)
}
