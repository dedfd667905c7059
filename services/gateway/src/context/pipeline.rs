use super::{PipelineStage, Rejection, TenantContext, TokenMeta};
use crate::auth::verifier::{TokenVerifier, VerifiedClaims};
use crate::gate::{GateDenial, PlanGate};
use crate::tenancy::{ResolveError, ResolvedTenant, RouteAccess, TenantResolver, explicit_hint};
use crate::usage::{UsageEvent, UsageRecorder};
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH};
use std::sync::Arc;
use std::time::Duration;
use tenantgate_authz::{AccessPolicy, RouteMatch};

pub const TENANT_HEADER: &str = "x-tenant-id";
const BEARER_PREFIX: &str = "bearer ";

#[derive(Debug, Clone, Copy)]
pub struct PipelineTimeouts {
    /// Whole admission, token to authorization.
    pub pipeline: Duration,
    /// Tenant resolution, including first-use provisioning.
    pub tenant_lookup: Duration,
}

/// Drives one request through the admission state machine.
pub struct ContextBuilder {
    verifier: TokenVerifier,
    resolver: TenantResolver,
    gate: PlanGate,
    policy: Arc<AccessPolicy>,
    usage: UsageRecorder,
    timeouts: PipelineTimeouts,
}

impl ContextBuilder {
    pub fn new(
        verifier: TokenVerifier,
        resolver: TenantResolver,
        gate: PlanGate,
        policy: Arc<AccessPolicy>,
        usage: UsageRecorder,
        timeouts: PipelineTimeouts,
    ) -> Self {
        Self {
            verifier,
            resolver,
            gate,
            policy,
            usage,
            timeouts,
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn gate(&self) -> &PlanGate {
        &self.gate
    }

    /// Admit or reject a request.
    ///
    /// On admission the request's usage is queued before returning; the
    /// queue never blocks or fails the caller.
    ///
    /// # Errors
    /// The [`Rejection`] for the first failing stage. Exceeding the pipeline
    /// deadline is `Rejection::Unavailable`.
    pub async fn build(
        &self,
        method: &str,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<TenantContext, Rejection> {
        let mut stage = PipelineStage::Unauthenticated;
        let admitted = tokio::time::timeout(
            self.timeouts.pipeline,
            self.admit(method, path, headers, &mut stage),
        )
        .await;
        let outcome = match admitted {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(stage = stage.as_str(), "admission deadline exceeded");
                Err(Rejection::Unavailable)
            }
        };

        match outcome {
            Ok(context) => {
                self.usage
                    .record(&context.tenant_id, &context.user_id, UsageEvent::ApiRequest);
                stage = PipelineStage::Complete;
                metrics::counter!("tenantgate_requests_total", "outcome" => "admitted")
                    .increment(1);
                tracing::debug!(
                    stage = stage.as_str(),
                    tenant_id = %context.tenant_id,
                    user_id = %context.user_id,
                    "request admitted"
                );
                Ok(context)
            }
            Err(rejection) => {
                metrics::counter!("tenantgate_requests_total", "outcome" => "rejected")
                    .increment(1);
                metrics::counter!(
                    "tenantgate_rejections_total",
                    "stage" => stage.as_str(),
                    "kind" => rejection.kind()
                )
                .increment(1);
                tracing::debug!(
                    from = stage.as_str(),
                    stage = PipelineStage::Rejected.as_str(),
                    kind = rejection.kind(),
                    %method,
                    %path,
                    "request rejected"
                );
                Err(rejection)
            }
        }
    }

    async fn admit(
        &self,
        method: &str,
        path: &str,
        headers: &HeaderMap,
        stage: &mut PipelineStage,
    ) -> Result<TenantContext, Rejection> {
        // Unauthenticated -> TokenVerified
        let claims = self.verify(headers).await?;
        *stage = PipelineStage::TokenVerified;

        // TokenVerified -> TenantResolved
        let Some(route) = self.policy.routes.lookup(method, path) else {
            tracing::debug!(%method, %path, "no access rule for route");
            return Err(Rejection::Forbidden("operation not permitted".to_string()));
        };
        let resolved = self.resolve(&claims, &route, headers).await?;
        *stage = PipelineStage::TenantResolved;

        // TenantResolved -> Authorized
        let context = self.authorize(&claims, &route, path, headers, resolved).await?;
        *stage = PipelineStage::Authorized;
        Ok(context)
    }

    async fn verify(&self, headers: &HeaderMap) -> Result<VerifiedClaims, Rejection> {
        let Some(token) = bearer_token(headers) else {
            tracing::debug!("missing bearer token");
            return Err(Rejection::Unauthorized);
        };
        self.verifier.verify(token).await.map_err(|err| {
            if err.is_retryable() {
                tracing::warn!(error = %err, "token verification unavailable");
                Rejection::Unavailable
            } else {
                tracing::debug!(error = %err, "token rejected");
                Rejection::Unauthorized
            }
        })
    }

    async fn resolve(
        &self,
        claims: &VerifiedClaims,
        route: &RouteMatch<'_>,
        headers: &HeaderMap,
    ) -> Result<ResolvedTenant, Rejection> {
        let header_hint = headers
            .get(TENANT_HEADER)
            .and_then(|value| value.to_str().ok());
        let explicit =
            explicit_hint(header_hint, route.tenant_hint.as_deref()).map_err(resolve_rejection)?;
        let access = RouteAccess {
            administrative: route.rule.administrative,
            sensitive: route.rule.sensitive,
        };
        match tokio::time::timeout(
            self.timeouts.tenant_lookup,
            self.resolver.resolve(claims, explicit.as_deref(), access),
        )
        .await
        {
            Ok(resolved) => resolved.map_err(resolve_rejection),
            Err(_) => {
                tracing::warn!(user_id = %claims.subject_id, "tenant lookup deadline exceeded");
                Err(Rejection::Unavailable)
            }
        }
    }

    async fn authorize(
        &self,
        claims: &VerifiedClaims,
        route: &RouteMatch<'_>,
        path: &str,
        headers: &HeaderMap,
        resolved: ResolvedTenant,
    ) -> Result<TenantContext, Rejection> {
        let ResolvedTenant {
            organization,
            membership,
        } = resolved;
        let permissions = self
            .policy
            .roles
            .effective_permissions(membership.role, &membership.permissions);

        if let Some(required) = route.rule.permission.as_deref()
            && !permissions.allows(required)
        {
            return Err(Rejection::Forbidden(format!(
                "insufficient permissions for {required}"
            )));
        }
        if let Some(min_role) = route.rule.min_role
            && !membership.role.satisfies(min_role)
        {
            return Err(Rejection::Forbidden(format!(
                "requires the {min_role} role or higher"
            )));
        }

        if let Some(feature) = self.policy.features.feature_for_path(path) {
            self.gate
                .check_feature_access(&organization, feature)
                .map_err(gate_rejection)?;
        }
        if let Some(quota) = &route.rule.quota {
            let delta = quota.amount.unwrap_or_else(|| content_length(headers));
            self.gate
                .check_quota(&organization, quota.kind, delta)
                .await
                .map_err(gate_rejection)?;
        }

        Ok(TenantContext {
            user_id: membership.user_id,
            tenant_id: organization.tenant_id,
            role: membership.role,
            permissions,
            organization_plan: organization.plan,
            organization_settings: organization.settings,
            is_primary_tenant: membership.is_primary,
            token: TokenMeta {
                issued_at: claims.issued_at,
                expires_at: claims.expires_at,
            },
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let prefix = value.get(..BEARER_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(BEARER_PREFIX) {
        return None;
    }
    let token = value[BEARER_PREFIX.len()..].trim();
    (!token.is_empty()).then_some(token)
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}

fn resolve_rejection(err: ResolveError) -> Rejection {
    match err {
        ResolveError::NotFound(message) => Rejection::NotFound(message),
        ResolveError::Forbidden(reason) => Rejection::Forbidden(reason.to_string()),
        ResolveError::Store(err) => {
            tracing::error!(error = ?err, "tenant store failure");
            Rejection::TenantError
        }
    }
}

fn gate_rejection(denial: GateDenial) -> Rejection {
    match denial {
        GateDenial::PaymentRequired(denied) => Rejection::PaymentRequired(denied),
        GateDenial::QuotaExceeded(denied) => Rejection::QuotaExceeded(denied),
        GateDenial::Store(err) => {
            tracing::error!(error = ?err, "quota read failure");
            Rejection::TenantError
        }
    }
}
