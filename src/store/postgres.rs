use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{ProjectStore, StoreError};
use crate::db;
use crate::models::{NewProject, Project, Tenant};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectStore for PgStore {
    async fn tenant(&self, id: Uuid) -> Result<Option<Tenant>, StoreError> {
        Ok(db::tenants::find_by_id(&self.pool, id).await?)
    }

    async fn adjust_quota(&self, tenant_id: Uuid, delta: i32) -> Result<Option<i32>, StoreError> {
        Ok(db::tenants::adjust_quota(&self.pool, tenant_id, delta).await?)
    }

    async fn decrement_quota_above(
        &self,
        tenant_id: Uuid,
        floor: i32,
    ) -> Result<Option<i32>, StoreError> {
        Ok(db::tenants::decrement_quota_above(&self.pool, tenant_id, floor).await?)
    }

    async fn insert_project(&self, new: NewProject) -> Result<Project, StoreError> {
        db::projects::create(&self.pool, &new)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    StoreError::DuplicateName(new.name.clone())
                }
                _ => StoreError::Database(e),
            })
    }

    async fn project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(db::projects::find_by_id(&self.pool, id).await?)
    }

    async fn projects_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Project>, StoreError> {
        Ok(db::projects::list_by_tenant(&self.pool, tenant_id).await?)
    }

    async fn delete_project(&self, id: Uuid) -> Result<(), StoreError> {
        Ok(db::projects::delete(&self.pool, id).await?)
    }

    async fn set_run_command(&self, id: Uuid, run_command: &[String]) -> Result<(), StoreError> {
        Ok(db::projects::set_run_command(&self.pool, id, run_command).await?)
    }

    async fn set_locked(&self, id: Uuid, locked: bool) -> Result<(), StoreError> {
        Ok(db::projects::set_locked(&self.pool, id, locked).await?)
    }

    async fn set_entitlement(
        &self,
        id: Uuid,
        expiry_date: DateTime<Utc>,
        locked: bool,
    ) -> Result<(), StoreError> {
        Ok(db::projects::set_entitlement(&self.pool, id, expiry_date, locked).await?)
    }

    async fn record_start(&self, id: Uuid, pid: i32, at: DateTime<Utc>) -> Result<(), StoreError> {
        Ok(db::projects::record_start(&self.pool, id, pid, at).await?)
    }

    async fn record_stop(&self, id: Uuid, exit_code: Option<i32>) -> Result<(), StoreError> {
        Ok(db::projects::record_stop(&self.pool, id, exit_code).await?)
    }

    async fn record_crash(&self, id: Uuid, exit_code: Option<i32>) -> Result<bool, StoreError> {
        Ok(db::projects::record_crash(&self.pool, id, exit_code).await?)
    }

    async fn tenants_with_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        Ok(db::projects::tenants_with_expired(&self.pool, now).await?)
    }
}
