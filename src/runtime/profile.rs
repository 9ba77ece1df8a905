//! Turns a project record into the isolation profile and launch plan for a run.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::LifecycleError;
use crate::config::{RuntimeSettings, SandboxSettings};
use crate::models::Project;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationProfile {
    pub root: PathBuf,
    pub safeguard_path: PathBuf,
    pub memory_bytes: u64,
    pub cpu_cores: Vec<u32>,
    pub network: bool,
    pub deny: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub profile: IsolationProfile,
    pub interpreter: PathBuf,
    pub args: Vec<String>,
    pub entry_script: String,
}

pub fn isolation_profile(project: &Project, sandbox: &SandboxSettings, network: bool) -> IsolationProfile {
    let ram_mb = u64::try_from(project.resource_limits.ram_mb).unwrap_or(0);
    IsolationProfile {
        root: project.root().to_path_buf(),
        safeguard_path: sandbox.safeguard_path.clone(),
        memory_bytes: ram_mb * 1024 * 1024,
        cpu_cores: cpu_affinity(project.id, project.resource_limits.cpu, &sandbox.cpu_pool),
        network,
        deny: sandbox.secret_files.clone(),
    }
}

/// Contiguous window of the core pool, sized by the cpu share and placed by the project id.
pub fn cpu_affinity(project_id: Uuid, cpu: i32, pool: &[u32]) -> Vec<u32> {
    if pool.is_empty() {
        return Vec::new();
    }
    let len = pool.len();
    let share = cpu.clamp(0, 100) as usize;
    let count = (share * len).div_ceil(100).clamp(1, len);
    let offset = (project_id.as_u128() % len as u128) as usize;
    (0..count).map(|i| pool[(offset + i) % len]).collect()
}

/// First argument after the interpreter that is not an option.
pub fn entry_script(run_command: &[String]) -> Option<&str> {
    run_command
        .iter()
        .skip(1)
        .map(String::as_str)
        .find(|arg| !arg.starts_with('-'))
}

pub fn interpreter_path(root: &Path, runtime: &RuntimeSettings) -> PathBuf {
    root.join(&runtime.env_dir).join(&runtime.interpreter)
}

pub fn launch_plan(
    project: &Project,
    sandbox: &SandboxSettings,
    runtime: &RuntimeSettings,
) -> Result<LaunchPlan, LifecycleError> {
    let entry = entry_script(&project.run_command)
        .ok_or_else(|| LifecycleError::ScriptMissing("<none>".to_string()))?
        .to_string();

    Ok(LaunchPlan {
        profile: isolation_profile(project, sandbox, sandbox.network),
        interpreter: interpreter_path(project.root(), runtime),
        args: project.run_command.iter().skip(1).cloned().collect(),
        entry_script: entry,
    })
}

/// The entry script must be a regular file that resolves inside the root.
pub async fn check_entry_script(root: &Path, script: &str) -> Result<(), LifecycleError> {
    let missing = || LifecycleError::ScriptMissing(script.to_string());
    let root = tokio::fs::canonicalize(root).await.map_err(|_| missing())?;
    let resolved = tokio::fs::canonicalize(root.join(script))
        .await
        .map_err(|_| missing())?;
    if !resolved.starts_with(&root) {
        return Err(missing());
    }
    let metadata = tokio::fs::metadata(&resolved).await.map_err(|_| missing())?;
    if !metadata.is_file() {
        return Err(missing());
    }
    Ok(())
}
