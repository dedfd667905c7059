//! In-memory implementation of the gateway stores.
//!
//! # Purpose
//! Implements [`TenantStore`] and [`UsageStore`] with `HashMap`s guarded by
//! `tokio::sync::RwLock`. It exists for:
//! - local development and tests (no external dependencies)
//! - single-instance deployments where durability is not required
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - **Single-process consistency**: every conditional write checks and
//!   inserts under one write lock, so two concurrent first requests from a new
//!   user observe exactly one winner.
//! - **No multi-node coordination**: separate gateway instances each hold
//!   independent state; use Postgres when running more than one.
//!
//! # Usage retention
//! Expired metrics are filtered on read and pruned opportunistically on
//! append; nothing deletes them on a timer.
//!
//! # Metrics
//! Keeps `tenantgate_store_organizations` and `tenantgate_store_memberships`
//! gauges current so dashboards behave the same as with durable backends.
use super::{StoreError, StoreResult, TenantStore, UsageStore};
use crate::model::{
    MembershipStatus, MembershipUpdate, MetricType, Organization, TenantMembership, UsageMetric,
    UsageTotal,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

type MembershipKey = (String, String);

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    /// Organizations keyed by tenant id.
    organizations: Arc<RwLock<HashMap<String, Organization>>>,
    /// Memberships keyed by `(user_id, tenant_id)`.
    memberships: Arc<RwLock<HashMap<MembershipKey, TenantMembership>>>,
    /// Bytes stored per tenant.
    storage: Arc<RwLock<HashMap<String, u64>>>,
    /// Append-only usage rows.
    usage: Arc<RwLock<Vec<UsageMetric>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored organizations (tests and diagnostics).
    pub async fn organization_count(&self) -> usize {
        self.organizations.read().await.len()
    }

    /// Number of stored memberships (tests and diagnostics).
    pub async fn membership_count(&self) -> usize {
        self.memberships.read().await.len()
    }
}

fn key(user_id: &str, tenant_id: &str) -> MembershipKey {
    (user_id.to_string(), tenant_id.to_string())
}

#[async_trait]
impl TenantStore for InMemoryStore {
    async fn get_organization(&self, tenant_id: &str) -> StoreResult<Option<Organization>> {
        Ok(self.organizations.read().await.get(tenant_id).cloned())
    }

    async fn create_organization_if_absent(&self, organization: Organization) -> StoreResult<bool> {
        let mut organizations = self.organizations.write().await;
        if organizations.contains_key(&organization.tenant_id) {
            return Ok(false);
        }
        organizations.insert(organization.tenant_id.clone(), organization);
        metrics::gauge!("tenantgate_store_organizations").set(organizations.len() as f64);
        Ok(true)
    }

    async fn get_membership(
        &self,
        user_id: &str,
        tenant_id: &str,
    ) -> StoreResult<Option<TenantMembership>> {
        Ok(self
            .memberships
            .read()
            .await
            .get(&key(user_id, tenant_id))
            .cloned())
    }

    async fn list_user_memberships(&self, user_id: &str) -> StoreResult<Vec<TenantMembership>> {
        let memberships = self.memberships.read().await;
        let mut items: Vec<_> = memberships
            .values()
            .filter(|membership| membership.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        Ok(items)
    }

    async fn list_tenant_memberships(&self, tenant_id: &str) -> StoreResult<Vec<TenantMembership>> {
        let memberships = self.memberships.read().await;
        let mut items: Vec<_> = memberships
            .values()
            .filter(|membership| membership.tenant_id == tenant_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.user_id.cmp(&b.user_id)));
        Ok(items)
    }

    async fn create_membership_if_absent(&self, membership: TenantMembership) -> StoreResult<bool> {
        // Organization must exist; lock order is organizations then memberships.
        let organizations = self.organizations.read().await;
        if !organizations.contains_key(&membership.tenant_id) {
            return Err(StoreError::NotFound(format!(
                "organization {}",
                membership.tenant_id
            )));
        }
        let mut memberships = self.memberships.write().await;
        let membership_key = key(&membership.user_id, &membership.tenant_id);
        if memberships.contains_key(&membership_key) {
            return Ok(false);
        }
        if membership.is_primary
            && memberships
                .values()
                .any(|existing| existing.user_id == membership.user_id && existing.is_primary)
        {
            return Err(StoreError::Conflict(format!(
                "user {} already has a primary tenant",
                membership.user_id
            )));
        }
        memberships.insert(membership_key, membership);
        metrics::gauge!("tenantgate_store_memberships").set(memberships.len() as f64);
        Ok(true)
    }

    async fn update_membership(
        &self,
        user_id: &str,
        tenant_id: &str,
        update: MembershipUpdate,
    ) -> StoreResult<TenantMembership> {
        let mut memberships = self.memberships.write().await;
        let membership = memberships
            .get_mut(&key(user_id, tenant_id))
            .ok_or_else(|| StoreError::NotFound(format!("membership {user_id}@{tenant_id}")))?;
        if membership.status == MembershipStatus::Removed {
            return Err(StoreError::Conflict(format!(
                "membership {user_id}@{tenant_id} is removed"
            )));
        }
        update.apply(membership);
        Ok(membership.clone())
    }

    async fn count_seats(&self, tenant_id: &str) -> StoreResult<u64> {
        let memberships = self.memberships.read().await;
        Ok(memberships
            .values()
            .filter(|membership| membership.tenant_id == tenant_id && membership.occupies_seat())
            .count() as u64)
    }

    async fn storage_used(&self, tenant_id: &str) -> StoreResult<u64> {
        Ok(self.storage.read().await.get(tenant_id).copied().unwrap_or(0))
    }

    async fn add_storage_used(&self, tenant_id: &str, bytes: u64) -> StoreResult<u64> {
        let mut storage = self.storage.write().await;
        let used = storage.entry(tenant_id.to_string()).or_insert(0);
        *used = used.saturating_add(bytes);
        Ok(*used)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl UsageStore for InMemoryStore {
    async fn append_usage(&self, metric: UsageMetric) -> StoreResult<()> {
        let now = Utc::now();
        let mut usage = self.usage.write().await;
        usage.retain(|existing| !existing.is_expired(now));
        usage.push(metric);
        Ok(())
    }

    async fn usage_totals(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<UsageTotal>> {
        let usage = self.usage.read().await;
        let mut totals: BTreeMap<MetricType, u64> = BTreeMap::new();
        for metric in usage
            .iter()
            .filter(|metric| metric.tenant_id == tenant_id && !metric.is_expired(now))
        {
            let total = totals.entry(metric.metric_type).or_insert(0);
            *total = total.saturating_add(metric.value);
        }
        Ok(totals
            .into_iter()
            .map(|(metric_type, total)| UsageTotal { metric_type, total })
            .collect())
    }
}
