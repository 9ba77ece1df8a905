//! Persistence seam for everything the lifecycle core mutates.
//!
//! The supervisor, the entitlement scheduler and the admission controller only
//! ever talk to a [`ProjectStore`]; routes that need plain reads may still go
//! through `crate::db` directly.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{NewProject, Project, Tenant};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("a project named '{0}' already exists")]
    DuplicateName(String),
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn tenant(&self, id: Uuid) -> Result<Option<Tenant>, StoreError>;

    /// Add `delta` to the tenant's quota. Returns the new quota, `None` if the tenant is unknown.
    async fn adjust_quota(&self, tenant_id: Uuid, delta: i32) -> Result<Option<i32>, StoreError>;

    /// Decrement the quota only if it is currently above `floor`.
    async fn decrement_quota_above(
        &self,
        tenant_id: Uuid,
        floor: i32,
    ) -> Result<Option<i32>, StoreError>;

    async fn insert_project(&self, new: NewProject) -> Result<Project, StoreError>;

    async fn project(&self, id: Uuid) -> Result<Option<Project>, StoreError>;

    /// All projects of a tenant, newest first.
    async fn projects_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Project>, StoreError>;

    async fn delete_project(&self, id: Uuid) -> Result<(), StoreError>;

    async fn set_run_command(&self, id: Uuid, run_command: &[String]) -> Result<(), StoreError>;

    async fn set_locked(&self, id: Uuid, locked: bool) -> Result<(), StoreError>;

    async fn set_entitlement(
        &self,
        id: Uuid,
        expiry_date: DateTime<Utc>,
        locked: bool,
    ) -> Result<(), StoreError>;

    async fn record_start(&self, id: Uuid, pid: i32, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn record_stop(&self, id: Uuid, exit_code: Option<i32>) -> Result<(), StoreError>;

    /// Move a running record to crashed. Returns false when the record was not running.
    async fn record_crash(&self, id: Uuid, exit_code: Option<i32>) -> Result<bool, StoreError>;

    async fn tenants_with_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError>;
}
