use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("project is already running")]
    AlreadyRunning,
    #[error("project is not running")]
    NotRunning,
    #[error("runtime environment not found, install dependencies first")]
    EnvironmentMissing,
    #[error("failed to create runtime environment: {0}")]
    EnvironmentSetup(String),
    #[error("entry script '{0}' not found")]
    ScriptMissing(String),
    #[error("failed to install dependencies: {0}")]
    InstallFailed(String),
    #[error("start did not complete within {0}s")]
    StartTimedOut(u64),
    #[error("process disappeared while it was being sampled")]
    ProcessVanished,
    #[error("project quota is already at the free tier")]
    BelowFreeTier,
    #[error("access denied")]
    AccessDenied,
    #[error("project is locked")]
    Locked,
    #[error("project quota of {quota} reached")]
    QuotaExceeded { quota: i32 },
    #[error("{0}")]
    InvalidInput(String),
    #[error("tenant not found")]
    TenantNotFound,
    #[error("project not found")]
    ProjectNotFound,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}
