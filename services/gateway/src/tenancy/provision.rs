//! Lazy creation of a user's personal tenant.
use crate::model::{
    MembershipStatus, Organization, OrganizationSettings, OrganizationStatus, TenantMembership,
};
use crate::store::{StoreError, StoreResult, TenantStore};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use tenantgate_authz::{PermissionSet, Plan, Role};

pub const PERSONAL_MAX_USERS: u64 = 1;
pub const PERSONAL_MAX_STORAGE_BYTES: u64 = 100 * 1024 * 1024;
const PERSONAL_TENANT_PREFIX: &str = "personal-";
const PERSONAL_TENANT_NAME: &str = "Personal workspace";
const TENANT_ID_HEX_LEN: usize = 24;

/// Deterministic personal tenant id for `user_id`.
pub fn personal_tenant_id(user_id: &str) -> String {
    let digest = hex::encode(Sha256::digest(user_id.as_bytes()));
    format!("{PERSONAL_TENANT_PREFIX}{}", &digest[..TENANT_ID_HEX_LEN])
}

/// Creates the personal organization and owner membership if absent.
///
/// Both writes are conditional, so a retry or a concurrent call for the same
/// user is a no-op. Returns the personal tenant id.
///
/// # Errors
/// - `StoreError::Conflict` when the user gained a primary membership
///   elsewhere between the caller's lookup and this call.
pub(crate) async fn provision_personal_tenant(
    store: &dyn TenantStore,
    user_id: &str,
    now: DateTime<Utc>,
) -> StoreResult<String> {
    let tenant_id = personal_tenant_id(user_id);
    let created_org = store
        .create_organization_if_absent(Organization {
            tenant_id: tenant_id.clone(),
            name: PERSONAL_TENANT_NAME.to_string(),
            plan: Plan::Free,
            status: OrganizationStatus::Active,
            settings: OrganizationSettings {
                max_users: PERSONAL_MAX_USERS,
                max_storage_bytes: PERSONAL_MAX_STORAGE_BYTES,
                features: BTreeSet::new(),
            },
            trial_ends_at: None,
        })
        .await?;
    let created_membership = match store
        .create_membership_if_absent(TenantMembership {
            user_id: user_id.to_string(),
            tenant_id: tenant_id.clone(),
            role: Role::Owner,
            permissions: PermissionSet::from_iter(["*"]),
            is_primary: true,
            status: MembershipStatus::Active,
            joined_at: now,
        })
        .await
    {
        Ok(created) => created,
        Err(StoreError::Conflict(reason)) => {
            // A concurrent provisioning of this same tenant already won.
            if store.get_membership(user_id, &tenant_id).await?.is_none() {
                return Err(StoreError::Conflict(reason));
            }
            false
        }
        Err(err) => return Err(err),
    };
    if created_org {
        metrics::counter!("tenantgate_tenants_provisioned_total").increment(1);
        tracing::info!(user_id, tenant_id = %tenant_id, "personal tenant provisioned");
    } else if created_membership {
        tracing::debug!(user_id, tenant_id = %tenant_id, "personal membership restored");
    }
    Ok(tenant_id)
}
