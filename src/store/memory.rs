use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{ProjectStore, StoreError};
use crate::models::{ExecStatus, NewProject, Project, Tenant};

/// In-process store backed by concurrent maps. Used by tests and by embedders
/// that do not run PostgreSQL.
#[derive(Default)]
pub struct MemoryStore {
    tenants: DashMap<Uuid, Tenant>,
    projects: DashMap<Uuid, Project>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tenant(&self, name: &str, project_quota: i32) -> Tenant {
        let tenant = Tenant {
            id: Uuid::now_v7(),
            email: format!("{name}@runhost.local"),
            password_hash: String::new(),
            name: name.to_string(),
            project_quota,
            is_system_admin: false,
            created_at: Utc::now(),
        };
        self.tenants.insert(tenant.id, tenant.clone());
        tenant
    }

    /// Overwrite a project's creation time.
    pub fn set_created_at(&self, id: Uuid, created_at: DateTime<Utc>) {
        if let Some(mut project) = self.projects.get_mut(&id) {
            project.created_at = created_at;
        }
    }

    fn update<F: FnOnce(&mut Project)>(&self, id: Uuid, f: F) {
        if let Some(mut project) = self.projects.get_mut(&id) {
            f(project.value_mut());
        }
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn tenant(&self, id: Uuid) -> Result<Option<Tenant>, StoreError> {
        Ok(self.tenants.get(&id).map(|t| t.clone()))
    }

    async fn adjust_quota(&self, tenant_id: Uuid, delta: i32) -> Result<Option<i32>, StoreError> {
        Ok(self.tenants.get_mut(&tenant_id).map(|mut t| {
            t.project_quota += delta;
            t.project_quota
        }))
    }

    async fn decrement_quota_above(
        &self,
        tenant_id: Uuid,
        floor: i32,
    ) -> Result<Option<i32>, StoreError> {
        let Some(mut tenant) = self.tenants.get_mut(&tenant_id) else {
            return Ok(None);
        };
        if tenant.project_quota <= floor {
            return Ok(None);
        }
        tenant.project_quota -= 1;
        Ok(Some(tenant.project_quota))
    }

    async fn insert_project(&self, new: NewProject) -> Result<Project, StoreError> {
        let duplicate = self
            .projects
            .iter()
            .any(|p| (p.tenant_id == new.tenant_id && p.name == new.name) || p.path == new.path);
        if duplicate {
            return Err(StoreError::DuplicateName(new.name));
        }
        let project = new.into_project(Utc::now());
        self.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.get(&id).map(|p| p.clone()))
    }

    async fn projects_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Project>, StoreError> {
        let mut projects: Vec<Project> = self
            .projects
            .iter()
            .filter(|p| p.tenant_id == tenant_id)
            .map(|p| p.clone())
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(projects)
    }

    async fn delete_project(&self, id: Uuid) -> Result<(), StoreError> {
        self.projects.remove(&id);
        Ok(())
    }

    async fn set_run_command(&self, id: Uuid, run_command: &[String]) -> Result<(), StoreError> {
        self.update(id, |p| p.run_command = run_command.to_vec());
        Ok(())
    }

    async fn set_locked(&self, id: Uuid, locked: bool) -> Result<(), StoreError> {
        self.update(id, |p| p.is_locked = locked);
        Ok(())
    }

    async fn set_entitlement(
        &self,
        id: Uuid,
        expiry_date: DateTime<Utc>,
        locked: bool,
    ) -> Result<(), StoreError> {
        self.update(id, |p| {
            p.expiry_date = Some(expiry_date);
            p.is_locked = locked;
        });
        Ok(())
    }

    async fn record_start(&self, id: Uuid, pid: i32, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.update(id, |p| {
            let info = &mut p.execution_info;
            info.is_running = true;
            info.pid = Some(pid);
            info.status = ExecStatus::Running;
            info.last_run_time = Some(at);
        });
        Ok(())
    }

    async fn record_stop(&self, id: Uuid, exit_code: Option<i32>) -> Result<(), StoreError> {
        self.update(id, |p| {
            let info = &mut p.execution_info;
            info.is_running = false;
            info.pid = None;
            info.status = ExecStatus::Stopped;
            if exit_code.is_some() {
                info.exit_code = exit_code;
            }
        });
        Ok(())
    }

    async fn record_crash(&self, id: Uuid, exit_code: Option<i32>) -> Result<bool, StoreError> {
        let Some(mut project) = self.projects.get_mut(&id) else {
            return Ok(false);
        };
        let info = &mut project.execution_info;
        if !info.is_running {
            return Ok(false);
        }
        info.is_running = false;
        info.pid = None;
        info.status = ExecStatus::Crashed;
        if exit_code.is_some() {
            info.exit_code = exit_code;
        }
        Ok(true)
    }

    async fn tenants_with_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let mut tenants: Vec<Uuid> = self
            .projects
            .iter()
            .filter(|p| !p.is_locked && p.is_expired_at(now))
            .map(|p| p.tenant_id)
            .collect();
        tenants.sort();
        tenants.dedup();
        Ok(tenants)
    }
}
