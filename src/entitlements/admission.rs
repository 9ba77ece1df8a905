use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use super::{TenantLocks, stop_if_running};
use crate::config::TierConfig;
use crate::models::{Project, ResourceLimits};
use crate::runtime::{LifecycleError, Supervisor};
use crate::store::ProjectStore;

/// Newest premium project whose lock state matches `want_locked`. Ties on
/// creation time go to the larger id.
pub fn select_candidate(projects: &[Project], want_locked: bool) -> Option<&Project> {
    projects
        .iter()
        .filter(|p| p.is_premium && p.is_locked == want_locked)
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
}

/// Tier decision for a project about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub is_premium: bool,
    pub expiry_date: Option<DateTime<Utc>>,
    pub resource_limits: ResourceLimits,
}

pub fn admission_for(
    project_count: usize,
    quota: i32,
    tiers: &TierConfig,
    now: DateTime<Utc>,
) -> Result<Admission, LifecycleError> {
    let count = i64::try_from(project_count).unwrap_or(i64::MAX);
    if count >= i64::from(quota) {
        return Err(LifecycleError::QuotaExceeded { quota });
    }

    let is_premium = count >= i64::from(tiers.free_quota);
    Ok(Admission {
        is_premium,
        expiry_date: is_premium.then(|| now + tiers.renewal_period()),
        resource_limits: ResourceLimits {
            cpu: tiers.cpu_share,
            ram_mb: if is_premium {
                tiers.premium_ram_mb
            } else {
                tiers.free_ram_mb
            },
            timeout_seconds: tiers.timeout_seconds,
        },
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotaChange {
    pub tenant_id: Uuid,
    pub project_quota: i32,
    /// The project that was unlocked or locked, if any.
    pub affected_project: Option<Uuid>,
}

pub struct QuotaController {
    store: Arc<dyn ProjectStore>,
    supervisor: Arc<Supervisor>,
    tiers: TierConfig,
    tenant_locks: Arc<TenantLocks>,
}

impl QuotaController {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        supervisor: Arc<Supervisor>,
        tiers: TierConfig,
        tenant_locks: Arc<TenantLocks>,
    ) -> Self {
        Self {
            store,
            supervisor,
            tiers,
            tenant_locks,
        }
    }

    pub fn tiers(&self) -> &TierConfig {
        &self.tiers
    }

    /// Hold this across admission and insertion so concurrent creations cannot both pass.
    pub async fn lock_tenant(&self, tenant_id: Uuid) -> OwnedMutexGuard<()> {
        self.tenant_locks.lock(tenant_id).await
    }

    /// Admin grant: +1 quota, then unlock the newest locked premium project.
    pub async fn grant(&self, tenant_id: Uuid) -> Result<QuotaChange, LifecycleError> {
        let _tenant = self.lock_tenant(tenant_id).await;
        let quota = self
            .store
            .adjust_quota(tenant_id, 1)
            .await?
            .ok_or(LifecycleError::TenantNotFound)?;

        let projects = self.store.projects_for_tenant(tenant_id).await?;
        let affected = match select_candidate(&projects, true) {
            Some(project) => {
                let expiry = self.tiers.renewal_policy.next_expiry(
                    project.expiry_date,
                    Utc::now(),
                    self.tiers.renewal_period(),
                );
                self.store.set_entitlement(project.id, expiry, false).await?;
                tracing::info!(project_id = %project.id, "Quota granted, project unlocked");
                Some(project.id)
            }
            None => None,
        };

        Ok(QuotaChange {
            tenant_id,
            project_quota: quota,
            affected_project: affected,
        })
    }

    /// Admin revoke: -1 quota, then stop and lock the newest unlocked premium project.
    pub async fn revoke(&self, tenant_id: Uuid) -> Result<QuotaChange, LifecycleError> {
        let _tenant = self.lock_tenant(tenant_id).await;
        if self.store.tenant(tenant_id).await?.is_none() {
            return Err(LifecycleError::TenantNotFound);
        }
        let quota = self
            .store
            .decrement_quota_above(tenant_id, self.tiers.free_quota)
            .await?
            .ok_or(LifecycleError::BelowFreeTier)?;

        let projects = self.store.projects_for_tenant(tenant_id).await?;
        let affected = match select_candidate(&projects, false) {
            Some(project) => {
                stop_if_running(&self.supervisor, project.id).await?;
                self.store.set_locked(project.id, true).await?;
                tracing::info!(project_id = %project.id, "Quota revoked, project locked");
                Some(project.id)
            }
            None => None,
        };

        Ok(QuotaChange {
            tenant_id,
            project_quota: quota,
            affected_project: affected,
        })
    }

    /// Slot purchase: +1 quota, nothing else changes.
    pub async fn purchase_slot(&self, tenant_id: Uuid) -> Result<QuotaChange, LifecycleError> {
        let _tenant = self.lock_tenant(tenant_id).await;
        let quota = self
            .store
            .adjust_quota(tenant_id, 1)
            .await?
            .ok_or(LifecycleError::TenantNotFound)?;
        tracing::info!(tenant_id = %tenant_id, project_quota = quota, "Project slot purchased");

        Ok(QuotaChange {
            tenant_id,
            project_quota: quota,
            affected_project: None,
        })
    }

    /// Decide whether the tenant may create another project and on which tier.
    /// The caller is expected to hold [`Self::lock_tenant`].
    pub async fn admit(&self, tenant_id: Uuid) -> Result<Admission, LifecycleError> {
        let tenant = self
            .store
            .tenant(tenant_id)
            .await?
            .ok_or(LifecycleError::TenantNotFound)?;
        let count = self.store.projects_for_tenant(tenant_id).await?.len();
        admission_for(count, tenant.project_quota, &self.tiers, Utc::now())
    }
}
