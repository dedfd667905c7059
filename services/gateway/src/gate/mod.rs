//! Plan and quota gate.
//!
//! # Purpose
//! Applies the billing-side checks after role authorization has passed:
//! premium features by plan tier, and numeric resource limits by live usage.
//!
//! # Key invariants
//! - Quota reads always go to the store; nothing here caches usage.
//! - The check and the write that consumes quota are separate calls, so
//!   concurrent admissions near a limit may overshoot it slightly.
use crate::model::{Organization, OrganizationSettings};
use crate::store::{StoreError, TenantStore};
use std::sync::Arc;
use tenantgate_authz::{
    FeatureDenied, FeatureRule, QuotaDenied, QuotaKind, check_feature_access, check_quota_limit,
};

#[derive(Debug, thiserror::Error)]
pub enum GateDenial {
    #[error("{0}")]
    PaymentRequired(FeatureDenied),
    #[error("{0}")]
    QuotaExceeded(QuotaDenied),
    #[error("quota read failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct PlanGate {
    store: Arc<dyn TenantStore>,
}

impl PlanGate {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self { store }
    }

    /// Admit when the plan tier is high enough or the organization holds the
    /// feature as an add-on.
    pub fn check_feature_access(
        &self,
        organization: &Organization,
        feature: &FeatureRule,
    ) -> Result<(), GateDenial> {
        if organization.settings.features.contains(&feature.feature) {
            return Ok(());
        }
        check_feature_access(organization.plan, feature).map_err(GateDenial::PaymentRequired)
    }

    /// Admit iff current usage plus `delta` stays within the organization's limit.
    pub async fn check_quota(
        &self,
        organization: &Organization,
        kind: QuotaKind,
        delta: u64,
    ) -> Result<(), GateDenial> {
        self.check_tenant_quota(&organization.tenant_id, &organization.settings, kind, delta)
            .await
    }

    /// Same check for callers that only hold the tenant id and its settings.
    pub async fn check_tenant_quota(
        &self,
        tenant_id: &str,
        settings: &OrganizationSettings,
        kind: QuotaKind,
        delta: u64,
    ) -> Result<(), GateDenial> {
        let (current, limit) = match kind {
            QuotaKind::Users => (self.store.count_seats(tenant_id).await?, settings.max_users),
            QuotaKind::StorageBytes => (
                self.store.storage_used(tenant_id).await?,
                settings.max_storage_bytes,
            ),
        };
        check_quota_limit(kind, current, delta, limit).map_err(|denied| {
            tracing::debug!(
                tenant_id,
                quota = %kind,
                current,
                delta,
                limit,
                "quota denied"
            );
            GateDenial::QuotaExceeded(denied)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MembershipStatus, OrganizationStatus, TenantMembership};
    use crate::store::memory::InMemoryStore;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use tenantgate_authz::{PermissionSet, Plan, Role};

    fn organization(plan: Plan, max_users: u64, max_storage_bytes: u64) -> Organization {
        Organization {
            tenant_id: "acme".to_string(),
            name: "Acme".to_string(),
            plan,
            status: OrganizationStatus::Active,
            settings: OrganizationSettings {
                max_users,
                max_storage_bytes,
                features: BTreeSet::new(),
            },
            trial_ends_at: None,
        }
    }

    fn analytics() -> FeatureRule {
        FeatureRule {
            feature: "analytics".to_string(),
            path_prefix: "/v1/usage".to_string(),
            min_plan: Plan::Pro,
        }
    }

    async fn add_member(store: &InMemoryStore, user_id: &str, status: MembershipStatus) {
        store
            .create_membership_if_absent(TenantMembership {
                user_id: user_id.to_string(),
                tenant_id: "acme".to_string(),
                role: Role::Member,
                permissions: PermissionSet::new(),
                is_primary: false,
                status,
                joined_at: Utc::now(),
            })
            .await
            .expect("membership");
    }

    #[test]
    fn free_plan_needs_an_upgrade() {
        let gate = PlanGate::new(Arc::new(InMemoryStore::new()));
        let err = gate
            .check_feature_access(&organization(Plan::Free, 1, 1), &analytics())
            .unwrap_err();
        let GateDenial::PaymentRequired(denied) = err else {
            panic!("expected payment required");
        };
        assert_eq!(denied.current_plan, Plan::Free);
        assert_eq!(denied.required_plan, Plan::Pro);

        assert!(gate.check_feature_access(&organization(Plan::Pro, 1, 1), &analytics()).is_ok());
        assert!(
            gate.check_feature_access(&organization(Plan::Enterprise, 1, 1), &analytics())
                .is_ok()
        );
    }

    #[test]
    fn add_on_features_bypass_the_plan_tier() {
        let gate = PlanGate::new(Arc::new(InMemoryStore::new()));
        let mut org = organization(Plan::Basic, 1, 1);
        org.settings.features.insert("analytics".to_string());
        assert!(gate.check_feature_access(&org, &analytics()).is_ok());
    }

    #[tokio::test]
    async fn seat_quota_admits_exactly_up_to_the_limit() {
        let store = Arc::new(InMemoryStore::new());
        let org = organization(Plan::Basic, 3, 0);
        store.create_organization_if_absent(org.clone()).await.expect("org");
        add_member(&store, "u1", MembershipStatus::Active).await;
        add_member(&store, "u2", MembershipStatus::Suspended).await;
        // Removed members free their seat.
        add_member(&store, "u3", MembershipStatus::Removed).await;

        let gate = PlanGate::new(store.clone());
        gate.check_quota(&org, QuotaKind::Users, 1).await.expect("third seat");
        add_member(&store, "u4", MembershipStatus::Active).await;
        let err = gate.check_quota(&org, QuotaKind::Users, 1).await.unwrap_err();
        let GateDenial::QuotaExceeded(denied) = err else {
            panic!("expected quota exceeded");
        };
        assert_eq!(denied.kind, QuotaKind::Users);
        assert_eq!((denied.current, denied.limit), (3, 3));
    }

    #[tokio::test]
    async fn storage_quota_reads_the_live_counter() {
        let store = Arc::new(InMemoryStore::new());
        let org = organization(Plan::Basic, 1, 100);
        store.create_organization_if_absent(org.clone()).await.expect("org");
        let gate = PlanGate::new(store.clone());

        gate.check_quota(&org, QuotaKind::StorageBytes, 100).await.expect("fits");
        store.add_storage_used("acme", 60).await.expect("bump");
        gate.check_quota(&org, QuotaKind::StorageBytes, 40).await.expect("boundary");
        let err = gate.check_quota(&org, QuotaKind::StorageBytes, 41).await.unwrap_err();
        assert!(err.to_string().contains("storage_bytes"));
    }
}
