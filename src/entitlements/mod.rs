//! Premium entitlements: expiry-driven locking, renewals and quota admission.

pub mod admission;

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::config::TierConfig;
use crate::models::Project;
use crate::runtime::registry::KeyedLocks;
use crate::runtime::{LifecycleError, Supervisor};
use crate::store::ProjectStore;

pub use admission::{Admission, QuotaChange, QuotaController, select_candidate};

/// Serialises entitlement changes per tenant.
pub type TenantLocks = KeyedLocks<Uuid, ()>;

/// How a renewal or grant moves the expiry date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenewalPolicy {
    /// `now + period`. Unused time is forfeited.
    #[default]
    Reset,
    /// `max(expiry, now) + period`.
    Extend,
}

impl RenewalPolicy {
    pub fn next_expiry(
        &self,
        current: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        period: Duration,
    ) -> DateTime<Utc> {
        match self {
            RenewalPolicy::Reset => now + period,
            RenewalPolicy::Extend => current.map_or(now, |expiry| expiry.max(now)) + period,
        }
    }
}

impl FromStr for RenewalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset" => Ok(RenewalPolicy::Reset),
            "extend" => Ok(RenewalPolicy::Extend),
            other => Err(format!("unknown renewal policy '{other}'")),
        }
    }
}

pub struct Entitlements {
    store: Arc<dyn ProjectStore>,
    supervisor: Arc<Supervisor>,
    tiers: TierConfig,
    tenant_locks: Arc<TenantLocks>,
}

impl Entitlements {
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

    /// Lock every expired premium project of the tenant and return its projects, newest first.
    pub async fn sweep(&self, tenant_id: Uuid) -> Result<Vec<Project>, LifecycleError> {
        self.sweep_at(tenant_id, Utc::now()).await
    }

    pub async fn sweep_at(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Project>, LifecycleError> {
        let _tenant = self.tenant_locks.lock(tenant_id).await;
        let projects = self.store.projects_for_tenant(tenant_id).await?;

        let mut locked_any = false;
        for project in projects.iter().filter(|p| !p.is_locked && p.is_expired_at(now)) {
            stop_if_running(&self.supervisor, project.id).await?;
            self.store.set_locked(project.id, true).await?;
            locked_any = true;
            tracing::info!(
                project_id = %project.id,
                tenant_id = %tenant_id,
                "Premium entitlement expired, project locked"
            );
        }

        if locked_any {
            Ok(self.store.projects_for_tenant(tenant_id).await?)
        } else {
            Ok(projects)
        }
    }

    /// Sweep every tenant that owns an expired project. Returns how many tenants were swept.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, LifecycleError> {
        let tenants = self.store.tenants_with_expired(now).await?;
        for tenant_id in &tenants {
            if let Err(e) = self.sweep_at(*tenant_id, now).await {
                tracing::warn!(tenant_id = %tenant_id, "Entitlement sweep failed: {e}");
            }
        }
        Ok(tenants.len())
    }

    /// Renewal payment: move the expiry per the policy and unlock.
    pub async fn renew(&self, project_id: Uuid) -> Result<Project, LifecycleError> {
        let project = self
            .store
            .project(project_id)
            .await?
            .ok_or(LifecycleError::ProjectNotFound)?;
        if !project.is_premium {
            return Err(LifecycleError::InvalidInput(
                "free-tier projects do not expire".to_string(),
            ));
        }

        let _tenant = self.tenant_locks.lock(project.tenant_id).await;
        let expiry = self.tiers.renewal_policy.next_expiry(
            project.expiry_date,
            Utc::now(),
            self.tiers.renewal_period(),
        );
        self.store.set_entitlement(project_id, expiry, false).await?;
        tracing::info!(project_id = %project_id, expiry = %expiry, "Project renewed");

        self.store
            .project(project_id)
            .await?
            .ok_or(LifecycleError::ProjectNotFound)
    }
}

/// Stop a project, treating "not running" as success.
pub async fn stop_if_running(supervisor: &Supervisor, project_id: Uuid) -> Result<(), LifecycleError> {
    match supervisor.stop(project_id).await {
        Ok(_) | Err(LifecycleError::NotRunning) => Ok(()),
        Err(e) => Err(e),
    }
}
