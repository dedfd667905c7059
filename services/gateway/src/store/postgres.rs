//! Postgres-backed implementation of the gateway stores.
//!
//! # What this module is
//! Implements [`TenantStore`] and [`UsageStore`] on Postgres (via `sqlx`) so
//! several gateway instances can share tenant state and provisioning stays
//! idempotent across processes.
//!
//! # Key invariants
//! - Conditional creates use `INSERT ... ON CONFLICT DO NOTHING` and report
//!   whether a row was inserted; the loser of a provisioning race reads back
//!   the winner's row.
//! - The partial unique index `memberships_one_primary_per_user` enforces the
//!   single-primary rule; violations surface as [`StoreError::Conflict`].
//! - Membership updates lock the row (`FOR UPDATE`) so the `removed` check and
//!   the write happen in one transaction.
//! - Usage rows are never deleted here; reads filter on `expires_at`.
//!
//! # Operational notes
//! - Migrations run at connect time via `sqlx::migrate!("./migrations")`.
//! - Pool size and acquire timeout are explicit so a slow database fails
//!   requests closed instead of hanging them.
//! - Database URLs may contain credentials; never log them.
use super::{StoreError, StoreResult, TenantStore, UsageStore, parse_column};
use crate::config::PostgresConfig;
use crate::model::{
    MembershipUpdate, MetricType, Organization, OrganizationSettings, TenantMembership,
    UsageMetric, UsageTotal,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;
use tenantgate_authz::PermissionSet;

pub struct PostgresStore {
    pool: PgPool,
}

#[derive(Debug, Clone, FromRow)]
struct DbOrganization {
    tenant_id: String,
    name: String,
    plan: String,
    status: String,
    max_users: i64,
    max_storage_bytes: i64,
    features: Vec<String>,
    trial_ends_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbOrganization> for Organization {
    type Error = StoreError;

    fn try_from(row: DbOrganization) -> Result<Self, Self::Error> {
        Ok(Organization {
            plan: parse_column("plan", &row.plan)?,
            status: parse_column("status", &row.status)?,
            settings: OrganizationSettings {
                max_users: to_u64("max_users", row.max_users)?,
                max_storage_bytes: to_u64("max_storage_bytes", row.max_storage_bytes)?,
                features: row.features.into_iter().collect(),
            },
            tenant_id: row.tenant_id,
            name: row.name,
            trial_ends_at: row.trial_ends_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct DbMembership {
    user_id: String,
    tenant_id: String,
    role: String,
    permissions: Vec<String>,
    is_primary: bool,
    status: String,
    joined_at: DateTime<Utc>,
}

impl TryFrom<DbMembership> for TenantMembership {
    type Error = StoreError;

    fn try_from(row: DbMembership) -> Result<Self, Self::Error> {
        Ok(TenantMembership {
            role: parse_column("role", &row.role)?,
            status: parse_column("status", &row.status)?,
            permissions: PermissionSet::from_iter(row.permissions),
            user_id: row.user_id,
            tenant_id: row.tenant_id,
            is_primary: row.is_primary,
            joined_at: row.joined_at,
        })
    }
}

const MEMBERSHIP_COLUMNS: &str =
    "user_id, tenant_id, role, permissions, is_primary, status, joined_at";

fn to_u64(column: &str, value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::Unexpected(anyhow!("negative {column}: {value}")))
}

fn to_i64(column: &str, value: u64) -> StoreResult<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::Unexpected(anyhow!("{column} out of range: {value}")))
}

impl PostgresStore {
    /// Connect, size the pool, and apply migrations before serving.
    ///
    /// # Errors
    /// - Invalid URL, unreachable database, or a failed migration.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options);
        let pool = tokio::time::timeout(Duration::from_millis(pg.connect_timeout_ms), pool)
            .await
            .map_err(|_| StoreError::Unexpected(anyhow!("postgres connect timed out")))??;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TenantStore for PostgresStore {
    async fn get_organization(&self, tenant_id: &str) -> StoreResult<Option<Organization>> {
        let row: Option<DbOrganization> = sqlx::query_as(
            "SELECT tenant_id, name, plan, status, max_users, max_storage_bytes, features, \
             trial_ends_at FROM organizations WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Organization::try_from).transpose()
    }

    async fn create_organization_if_absent(&self, organization: Organization) -> StoreResult<bool> {
        let features: Vec<String> = organization.settings.features.iter().cloned().collect();
        let result = sqlx::query(
            "INSERT INTO organizations \
             (tenant_id, name, plan, status, max_users, max_storage_bytes, features, trial_ends_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (tenant_id) DO NOTHING",
        )
        .bind(&organization.tenant_id)
        .bind(&organization.name)
        .bind(organization.plan.as_str())
        .bind(organization.status.as_str())
        .bind(to_i64("max_users", organization.settings.max_users)?)
        .bind(to_i64("max_storage_bytes", organization.settings.max_storage_bytes)?)
        .bind(features)
        .bind(organization.trial_ends_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_membership(
        &self,
        user_id: &str,
        tenant_id: &str,
    ) -> StoreResult<Option<TenantMembership>> {
        let row: Option<DbMembership> = sqlx::query_as(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE user_id = $1 AND tenant_id = $2"
        ))
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TenantMembership::try_from).transpose()
    }

    async fn list_user_memberships(&self, user_id: &str) -> StoreResult<Vec<TenantMembership>> {
        let rows: Vec<DbMembership> = sqlx::query_as(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE user_id = $1 ORDER BY tenant_id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TenantMembership::try_from).collect()
    }

    async fn list_tenant_memberships(&self, tenant_id: &str) -> StoreResult<Vec<TenantMembership>> {
        let rows: Vec<DbMembership> = sqlx::query_as(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE tenant_id = $1 \
             ORDER BY joined_at, user_id"
        ))
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TenantMembership::try_from).collect()
    }

    async fn create_membership_if_absent(&self, membership: TenantMembership) -> StoreResult<bool> {
        let permissions = membership.permissions.clone().into_vec();
        let result = sqlx::query(
            "INSERT INTO memberships \
             (user_id, tenant_id, role, permissions, is_primary, status, joined_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id, tenant_id) DO NOTHING",
        )
        .bind(&membership.user_id)
        .bind(&membership.tenant_id)
        .bind(membership.role.as_str())
        .bind(permissions)
        .bind(membership.is_primary)
        .bind(membership.status.as_str())
        .bind(membership.joined_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_membership(
        &self,
        user_id: &str,
        tenant_id: &str,
        update: MembershipUpdate,
    ) -> StoreResult<TenantMembership> {
        let mut tx = self.pool.begin().await?;
        let row: Option<DbMembership> = sqlx::query_as(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships \
             WHERE user_id = $1 AND tenant_id = $2 FOR UPDATE"
        ))
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?;
        let mut membership = match row {
            Some(row) => TenantMembership::try_from(row)?,
            None => {
                return Err(StoreError::NotFound(format!(
                    "membership {user_id}@{tenant_id}"
                )));
            }
        };
        if !membership.occupies_seat() {
            return Err(StoreError::Conflict(format!(
                "membership {user_id}@{tenant_id} is removed"
            )));
        }
        update.apply(&mut membership);
        sqlx::query(
            "UPDATE memberships SET role = $3, status = $4 WHERE user_id = $1 AND tenant_id = $2",
        )
        .bind(user_id)
        .bind(tenant_id)
        .bind(membership.role.as_str())
        .bind(membership.status.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(membership)
    }

    async fn count_seats(&self, tenant_id: &str) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM memberships WHERE tenant_id = $1 AND status <> 'removed'",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;
        to_u64("seat count", count)
    }

    async fn storage_used(&self, tenant_id: &str) -> StoreResult<u64> {
        let used: Option<i64> =
            sqlx::query_scalar("SELECT bytes_used FROM tenant_storage WHERE tenant_id = $1")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;
        to_u64("bytes_used", used.unwrap_or(0))
    }

    async fn add_storage_used(&self, tenant_id: &str, bytes: u64) -> StoreResult<u64> {
        let used: i64 = sqlx::query_scalar(
            "INSERT INTO tenant_storage (tenant_id, bytes_used) VALUES ($1, $2) \
             ON CONFLICT (tenant_id) DO UPDATE \
             SET bytes_used = tenant_storage.bytes_used + EXCLUDED.bytes_used \
             RETURNING bytes_used",
        )
        .bind(tenant_id)
        .bind(to_i64("bytes", bytes)?)
        .fetch_one(&self.pool)
        .await?;
        to_u64("bytes_used", used)
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl UsageStore for PostgresStore {
    async fn append_usage(&self, metric: UsageMetric) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO usage_metrics \
             (tenant_id, metric_key, metric_type, value, user_id, recorded_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&metric.tenant_id)
        .bind(&metric.metric_key)
        .bind(metric.metric_type.as_str())
        .bind(to_i64("value", metric.value)?)
        .bind(&metric.user_id)
        .bind(metric.timestamp)
        .bind(metric.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn usage_totals(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<UsageTotal>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT metric_type, COALESCE(SUM(value), 0)::BIGINT \
             FROM usage_metrics WHERE tenant_id = $1 AND expires_at > $2 \
             GROUP BY metric_type ORDER BY metric_type",
        )
        .bind(tenant_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(metric_type, total)| -> StoreResult<UsageTotal> {
                Ok(UsageTotal {
                    metric_type: parse_column::<MetricType>("metric_type", &metric_type)?,
                    total: to_u64("total", total)?,
                })
            })
            .collect()
    }
}
