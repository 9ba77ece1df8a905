use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "exec_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    NotRun,
    Running,
    Success,
    Fail,
    Stopped,
    Crashed,
}

impl ExecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecStatus::NotRun => "not_run",
            ExecStatus::Running => "running",
            ExecStatus::Success => "success",
            ExecStatus::Fail => "fail",
            ExecStatus::Stopped => "stopped",
            ExecStatus::Crashed => "crashed",
        }
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits fixed at creation from the tenant's tier.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu: i32,
    pub ram_mb: i32,
    pub timeout_seconds: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub last_run_time: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub status: ExecStatus,
    pub log_file: String,
    pub is_running: bool,
    pub pid: Option<i32>,
}

impl ExecutionInfo {
    pub fn fresh(log_file: String) -> Self {
        Self {
            last_run_time: None,
            exit_code: None,
            status: ExecStatus::NotRun,
            log_file,
            is_running: false,
            pid: None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub is_premium: bool,
    pub expiry_date: Option<DateTime<Utc>>,
    pub is_locked: bool,
    pub run_command: Vec<String>,
    #[sqlx(flatten)]
    pub resource_limits: ResourceLimits,
    #[sqlx(flatten)]
    pub execution_info: ExecutionInfo,
    #[serde(skip)]
    pub filebrowser_user: String,
    #[serde(skip)]
    pub filebrowser_pass: String,
}

impl Project {
    pub fn root(&self) -> &Path {
        Path::new(&self.path)
    }

    pub fn log_path(&self) -> PathBuf {
        PathBuf::from(&self.execution_info.log_file)
    }

    /// True when a premium window exists and has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && self.expiry_date.is_some_and(|expiry| expiry < now)
    }
}

/// Everything needed to insert a project record.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub path: String,
    pub is_premium: bool,
    pub expiry_date: Option<DateTime<Utc>>,
    pub run_command: Vec<String>,
    pub resource_limits: ResourceLimits,
    pub log_file: String,
    pub filebrowser_user: String,
    pub filebrowser_pass: String,
}

impl NewProject {
    pub fn into_project(self, created_at: DateTime<Utc>) -> Project {
        Project {
            id: self.id,
            tenant_id: self.tenant_id,
            name: self.name,
            path: self.path,
            created_at,
            is_premium: self.is_premium,
            expiry_date: self.expiry_date,
            is_locked: false,
            run_command: self.run_command,
            resource_limits: self.resource_limits,
            execution_info: ExecutionInfo::fresh(self.log_file),
            filebrowser_user: self.filebrowser_user,
            filebrowser_pass: self.filebrowser_pass,
        }
    }
}
