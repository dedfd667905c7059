//! Tenant, membership and usage stores.
//!
//! # Purpose
//! Abstracts persistence behind two traits so the pipeline can run against
//! the in-memory backend in tests and Postgres in production.
//!
//! # Key invariants
//! - `create_*_if_absent` are conditional writes: they report whether this
//!   call created the record and never overwrite an existing one.
//! - At most one primary membership per user; violating writes fail with
//!   [`StoreError::Conflict`].
//! - Usage metrics are append-only; reads skip expired rows.
use crate::model::{
    MembershipUpdate, Organization, TenantMembership, UsageMetric, UsageTotal,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::Conflict(db_err.message().to_string());
            }
            if db_err.is_foreign_key_violation() {
                return StoreError::NotFound(db_err.message().to_string());
            }
        }
        StoreError::Unexpected(err.into())
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Unexpected(err.into())
    }
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn get_organization(&self, tenant_id: &str) -> StoreResult<Option<Organization>>;
    /// Returns `true` if this call created the organization.
    async fn create_organization_if_absent(&self, organization: Organization) -> StoreResult<bool>;

    async fn get_membership(
        &self,
        user_id: &str,
        tenant_id: &str,
    ) -> StoreResult<Option<TenantMembership>>;
    async fn list_user_memberships(&self, user_id: &str) -> StoreResult<Vec<TenantMembership>>;
    async fn list_tenant_memberships(&self, tenant_id: &str) -> StoreResult<Vec<TenantMembership>>;
    /// Returns `true` if this call created the membership.
    async fn create_membership_if_absent(&self, membership: TenantMembership) -> StoreResult<bool>;
    /// Applies `update`; `removed` memberships are terminal and reject updates.
    async fn update_membership(
        &self,
        user_id: &str,
        tenant_id: &str,
        update: MembershipUpdate,
    ) -> StoreResult<TenantMembership>;
    /// Memberships that are not `removed`.
    async fn count_seats(&self, tenant_id: &str) -> StoreResult<u64>;

    async fn storage_used(&self, tenant_id: &str) -> StoreResult<u64>;
    /// Adds `bytes` to the tenant's storage counter and returns the new total.
    async fn add_storage_used(&self, tenant_id: &str, bytes: u64) -> StoreResult<u64>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn append_usage(&self, metric: UsageMetric) -> StoreResult<()>;
    /// Totals per metric type over rows unexpired at `now`.
    async fn usage_totals(&self, tenant_id: &str, now: DateTime<Utc>)
    -> StoreResult<Vec<UsageTotal>>;
}

pub trait GatewayStore: TenantStore + UsageStore {}

impl<T: TenantStore + UsageStore> GatewayStore for T {}

fn parse_column<T>(column: &str, value: &str) -> StoreResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|err: T::Err| StoreError::Unexpected(anyhow::anyhow!("invalid {column}: {err}")))
}
