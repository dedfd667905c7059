use super::provision::provision_personal_tenant;
use crate::auth::verifier::VerifiedClaims;
use crate::model::{MembershipStatus, Organization, TenantMembership};
use crate::store::{StoreError, TenantStore};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;

/// Route flags that change how tenant state failures are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteAccess {
    /// Reachable while the organization is suspended or its trial expired.
    pub administrative: bool,
    /// Non-active membership statuses are reported as a generic denial.
    pub sensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTenant {
    pub organization: Organization,
    pub membership: TenantMembership,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    TenantMismatch,
    NotMember,
    OrganizationSuspended,
    TrialExpired,
    Membership(MembershipStatus),
    AccessDenied,
}

impl fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForbiddenReason::TenantMismatch => f.write_str("tenant mismatch"),
            ForbiddenReason::NotMember => f.write_str("not a member of this tenant"),
            ForbiddenReason::OrganizationSuspended => f.write_str("organization suspended"),
            ForbiddenReason::TrialExpired => f.write_str("trial expired"),
            ForbiddenReason::Membership(status) => write!(f, "membership {status}"),
            ForbiddenReason::AccessDenied => f.write_str("access denied"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(ForbiddenReason),
    #[error("tenant store: {0}")]
    Store(#[from] StoreError),
}

/// Combine the header and path hints. Both are explicit; they must agree.
pub fn explicit_hint(
    header: Option<&str>,
    path: Option<&str>,
) -> Result<Option<String>, ResolveError> {
    match (clean(header), clean(path)) {
        (Some(header), Some(path)) if header != path => {
            Err(ResolveError::Forbidden(ForbiddenReason::TenantMismatch))
        }
        (Some(hint), _) | (None, Some(hint)) => Ok(Some(hint.to_string())),
        (None, None) => Ok(None),
    }
}

fn clean(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[derive(Clone)]
pub struct TenantResolver {
    store: Arc<dyn TenantStore>,
}

impl TenantResolver {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self { store }
    }

    /// Resolve the acting tenant for `claims`.
    ///
    /// # Errors
    /// - `ResolveError::NotFound` when the hinted tenant does not exist, or the
    ///   caller has memberships but no unique active primary one.
    /// - `ResolveError::Forbidden` when the caller is not an active member, or
    ///   the organization is suspended or past its trial on a
    ///   non-administrative route.
    /// - `ResolveError::Store` for backend failures.
    pub async fn resolve(
        &self,
        claims: &VerifiedClaims,
        explicit_hint: Option<&str>,
        access: RouteAccess,
    ) -> Result<ResolvedTenant, ResolveError> {
        let user_id = claims.subject_id.as_str();
        // Step 1: explicit hint, then the token's tenant claim.
        let hinted = explicit_hint.or(claims.tenant_hint.as_deref());

        // Step 2: fall back to the primary membership, provisioning if needed.
        let tenant_id = match hinted {
            Some(tenant_id) => tenant_id.to_string(),
            None => self.primary_tenant(user_id).await?,
        };

        // Step 3: load both records; membership first so non-members learn
        // nothing about the organization's state.
        let organization = self
            .store
            .get_organization(&tenant_id)
            .await?
            .ok_or_else(|| ResolveError::NotFound("tenant not found".to_string()))?;
        let membership = self
            .store
            .get_membership(user_id, &tenant_id)
            .await?
            .ok_or(ResolveError::Forbidden(ForbiddenReason::NotMember))?;

        // Step 4: organization state gates everything but administrative routes.
        if !access.administrative {
            if organization.is_suspended() {
                return Err(ResolveError::Forbidden(ForbiddenReason::OrganizationSuspended));
            }
            if organization.is_trial_expired(Utc::now()) {
                return Err(ResolveError::Forbidden(ForbiddenReason::TrialExpired));
            }
        }

        // Step 5: the membership itself must be active.
        if !membership.is_active() {
            let reason = if access.sensitive {
                ForbiddenReason::AccessDenied
            } else {
                ForbiddenReason::Membership(membership.status)
            };
            return Err(ResolveError::Forbidden(reason));
        }

        Ok(ResolvedTenant {
            organization,
            membership,
        })
    }

    async fn primary_tenant(&self, user_id: &str) -> Result<String, ResolveError> {
        let memberships = self.store.list_user_memberships(user_id).await?;
        if memberships.is_empty() {
            return match provision_personal_tenant(self.store.as_ref(), user_id, Utc::now()).await {
                Ok(tenant_id) => Ok(tenant_id),
                // Someone else gave the user a primary tenant meanwhile.
                Err(StoreError::Conflict(_)) => self.unique_primary(user_id).await,
                Err(err) => Err(err.into()),
            };
        }
        pick_primary(&memberships)
    }

    async fn unique_primary(&self, user_id: &str) -> Result<String, ResolveError> {
        let memberships = self.store.list_user_memberships(user_id).await?;
        pick_primary(&memberships)
    }
}

fn pick_primary(memberships: &[TenantMembership]) -> Result<String, ResolveError> {
    let mut primaries = memberships
        .iter()
        .filter(|membership| membership.is_primary && membership.is_active());
    match (primaries.next(), primaries.next()) {
        (Some(primary), None) => Ok(primary.tenant_id.clone()),
        _ => Err(ResolveError::NotFound(
            "no primary tenant; specify X-Tenant-Id".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OrganizationSettings, OrganizationStatus};
    use crate::store::memory::InMemoryStore;
    use crate::tenancy::personal_tenant_id;
    use chrono::Duration;
    use serde_json::Map;
    use std::collections::BTreeSet;
    use tenantgate_authz::{PermissionSet, Plan, Role};

    fn claims(user_id: &str, tenant_hint: Option<&str>) -> VerifiedClaims {
        VerifiedClaims {
            subject_id: user_id.to_string(),
            issuer: "https://idp.example/".to_string(),
            audience: "tenantgate".to_string(),
            issued_at: Utc::now(),
            expires_at: Utc::now() + Duration::minutes(5),
            tenant_hint: tenant_hint.map(str::to_string),
            raw_claims: Map::new(),
        }
    }

    fn organization(tenant_id: &str, status: OrganizationStatus) -> Organization {
        Organization {
            tenant_id: tenant_id.to_string(),
            name: tenant_id.to_string(),
            plan: Plan::Basic,
            status,
            settings: OrganizationSettings {
                max_users: 10,
                max_storage_bytes: 1 << 20,
                features: BTreeSet::new(),
            },
            trial_ends_at: None,
        }
    }

    fn membership(
        user_id: &str,
        tenant_id: &str,
        is_primary: bool,
        status: MembershipStatus,
    ) -> TenantMembership {
        TenantMembership {
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            role: Role::Member,
            permissions: PermissionSet::new(),
            is_primary,
            status,
            joined_at: Utc::now(),
        }
    }

    async fn seeded(
        orgs: Vec<Organization>,
        memberships: Vec<TenantMembership>,
    ) -> (Arc<InMemoryStore>, TenantResolver) {
        let store = Arc::new(InMemoryStore::new());
        for org in orgs {
            store.create_organization_if_absent(org).await.expect("org");
        }
        for membership in memberships {
            store.create_membership_if_absent(membership).await.expect("membership");
        }
        let resolver = TenantResolver::new(store.clone());
        (store, resolver)
    }

    #[test]
    fn explicit_hints_must_agree() {
        assert_eq!(explicit_hint(Some("a"), None).expect("hint"), Some("a".to_string()));
        assert_eq!(explicit_hint(None, Some("b")).expect("hint"), Some("b".to_string()));
        assert_eq!(explicit_hint(Some("a"), Some("a")).expect("hint"), Some("a".to_string()));
        assert_eq!(explicit_hint(Some("  "), None).expect("hint"), None);
        assert_eq!(
            explicit_hint(Some(" a "), Some("a")).expect("hint"),
            Some("a".to_string())
        );
        assert!(matches!(
            explicit_hint(Some("a"), Some("b")),
            Err(ResolveError::Forbidden(ForbiddenReason::TenantMismatch))
        ));
    }

    #[tokio::test]
    async fn explicit_hint_beats_token_claim_and_primary() {
        let (_, resolver) = seeded(
            vec![
                organization("acme", OrganizationStatus::Active),
                organization("globex", OrganizationStatus::Active),
            ],
            vec![
                membership("u1", "acme", true, MembershipStatus::Active),
                membership("u1", "globex", false, MembershipStatus::Active),
            ],
        )
        .await;
        let resolved = resolver
            .resolve(&claims("u1", Some("acme")), Some("globex"), RouteAccess::default())
            .await
            .expect("resolved");
        assert_eq!(resolved.organization.tenant_id, "globex");

        let resolved = resolver
            .resolve(&claims("u1", Some("globex")), None, RouteAccess::default())
            .await
            .expect("resolved");
        assert_eq!(resolved.organization.tenant_id, "globex");

        let resolved = resolver
            .resolve(&claims("u1", None), None, RouteAccess::default())
            .await
            .expect("resolved");
        assert_eq!(resolved.organization.tenant_id, "acme");
    }

    #[tokio::test]
    async fn new_users_get_a_personal_tenant() {
        let (store, resolver) = seeded(vec![], vec![]).await;
        let resolved = resolver
            .resolve(&claims("new-user", None), None, RouteAccess::default())
            .await
            .expect("resolved");
        assert_eq!(resolved.organization.tenant_id, personal_tenant_id("new-user"));
        assert_eq!(resolved.organization.plan, Plan::Free);
        assert_eq!(resolved.membership.role, Role::Owner);
        assert_eq!(store.organization_count().await, 1);
    }

    #[tokio::test]
    async fn missing_unique_primary_is_not_found() {
        let (store, resolver) = seeded(
            vec![organization("acme", OrganizationStatus::Active)],
            vec![membership("u1", "acme", false, MembershipStatus::Active)],
        )
        .await;
        let err = resolver
            .resolve(&claims("u1", None), None, RouteAccess::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
        // No personal tenant for a user who already belongs somewhere.
        assert_eq!(store.organization_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_tenant_and_non_members() {
        let (_, resolver) = seeded(
            vec![organization("acme", OrganizationStatus::Suspended)],
            vec![],
        )
        .await;
        let err = resolver
            .resolve(&claims("u1", None), Some("nope"), RouteAccess::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
        let err = resolver
            .resolve(&claims("u1", None), Some("acme"), RouteAccess::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Forbidden(ForbiddenReason::NotMember)));
    }

    #[tokio::test]
    async fn suspended_and_expired_orgs_only_admit_administrative_routes() {
        let mut expired = organization("trial", OrganizationStatus::Trial);
        expired.trial_ends_at = Some(Utc::now() - Duration::days(1));
        let (_, resolver) = seeded(
            vec![organization("acme", OrganizationStatus::Suspended), expired],
            vec![
                membership("u1", "acme", true, MembershipStatus::Active),
                membership("u1", "trial", false, MembershipStatus::Active),
            ],
        )
        .await;
        let err = resolver
            .resolve(&claims("u1", None), Some("acme"), RouteAccess::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Forbidden(ForbiddenReason::OrganizationSuspended)
        ));
        let err = resolver
            .resolve(&claims("u1", None), Some("trial"), RouteAccess::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Forbidden(ForbiddenReason::TrialExpired)));

        let admin = RouteAccess {
            administrative: true,
            sensitive: false,
        };
        resolver
            .resolve(&claims("u1", None), Some("acme"), admin)
            .await
            .expect("administrative route");
    }

    #[tokio::test]
    async fn inactive_membership_status_is_masked_on_sensitive_routes() {
        let (_, resolver) = seeded(
            vec![organization("acme", OrganizationStatus::Active)],
            vec![membership("u1", "acme", true, MembershipStatus::Suspended)],
        )
        .await;
        let err = resolver
            .resolve(&claims("u1", None), Some("acme"), RouteAccess::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "membership suspended");
        let sensitive = RouteAccess {
            administrative: false,
            sensitive: true,
        };
        let err = resolver
            .resolve(&claims("u1", None), Some("acme"), sensitive)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "access denied");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_requests_converge() {
        let (store, resolver) = seeded(vec![], vec![]).await;
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let resolver = resolver.clone();
                tokio::spawn(async move {
                    resolver
                        .resolve(&claims("racer", None), None, RouteAccess::default())
                        .await
                })
            })
            .collect();
        for task in tasks {
            let resolved = task.await.expect("join").expect("resolved");
            assert_eq!(resolved.organization.tenant_id, personal_tenant_id("racer"));
        }
        assert_eq!(store.organization_count().await, 1);
        assert_eq!(store.membership_count().await, 1);
    }
}
