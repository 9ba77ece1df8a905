use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use serde::Serialize;
use tokio::process::Command;
use uuid::Uuid;

use super::LifecycleError;
use super::prepare::Preparer;
use super::procstat;
use super::profile::{check_entry_script, interpreter_path, launch_plan};
use super::reconcile::reconcile;
use super::registry::{Liveness, ProcessRegistry, Slot, Tracked, exit_code};
use super::sandbox::{SandboxBackend, backend_for};
use crate::config::{Config, LifecycleTimings, RuntimeSettings, SandboxSettings};
use crate::models::{ExecStatus, Project};
use crate::store::ProjectStore;

#[derive(Debug, Clone, Default)]
pub struct SupervisorOptions {
    pub sandbox: SandboxSettings,
    pub runtime: RuntimeSettings,
    pub timings: LifecycleTimings,
}

impl SupervisorOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sandbox: config.sandbox.clone(),
            runtime: config.runtime.clone(),
            timings: config.timings.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub pid: u32,
    pub ram_mb: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub project_id: Uuid,
    pub name: String,
    pub status: ExecStatus,
    pub pid: Option<u32>,
    pub uptime_seconds: Option<u64>,
    pub last_run_time: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub run_command: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Usage {
    pub pid: u32,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub memory_mb: f64,
}

/// Owns the live children of this host. Every operation on a project runs
/// under that project's slot lock and re-reads the record under it.
pub struct Supervisor {
    store: Arc<dyn ProjectStore>,
    backend: Arc<dyn SandboxBackend>,
    registry: ProcessRegistry,
    options: SupervisorOptions,
}

impl Supervisor {
    pub fn new(store: Arc<dyn ProjectStore>, options: SupervisorOptions) -> Self {
        let backend = backend_for(options.sandbox.kind);
        Self::with_backend(store, backend, options)
    }

    pub fn with_backend(
        store: Arc<dyn ProjectStore>,
        backend: Arc<dyn SandboxBackend>,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            store,
            backend,
            registry: ProcessRegistry::new(),
            options,
        }
    }

    pub fn backend(&self) -> &dyn SandboxBackend {
        self.backend.as_ref()
    }

    pub fn tracked_count(&self) -> usize {
        self.registry.tracked_count()
    }

    /// Stop the project if it runs, then run `teardown` and release the slot,
    /// all under one hold of the slot lock. Starts queued behind it find no record.
    pub async fn remove<F, Fut>(&self, project_id: Uuid, teardown: F) -> Result<(), LifecycleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), LifecycleError>>,
    {
        let mut slot = self.registry.lock(project_id).await;
        match self.stop_locked(project_id, &mut slot).await {
            Ok(_) | Err(LifecycleError::NotRunning) => {}
            Err(e) => return Err(e),
        }
        teardown().await?;
        self.registry.forget(project_id);
        Ok(())
    }

    pub async fn start(&self, project: &Project) -> Result<StartOutcome, LifecycleError> {
        let mut slot = self.registry.lock(project.id).await;
        self.start_locked(project.id, &mut slot).await
    }

    /// Stop a tracked child. Returns its exit code.
    pub async fn stop(&self, project_id: Uuid) -> Result<Option<i32>, LifecycleError> {
        let mut slot = self.registry.lock(project_id).await;
        self.stop_locked(project_id, &mut slot).await
    }

    pub async fn restart(&self, project: &Project) -> Result<StartOutcome, LifecycleError> {
        let mut slot = self.registry.lock(project.id).await;
        if self.fresh(project.id).await?.is_locked {
            return Err(LifecycleError::Locked);
        }

        match self.stop_locked(project.id, &mut slot).await {
            Ok(_) => tokio::time::sleep(self.options.timings.restart_settle).await,
            Err(LifecycleError::NotRunning) => {}
            Err(e) => return Err(e),
        }
        self.start_locked(project.id, &mut slot).await
    }

    pub async fn status(&self, project: &Project) -> Result<ExecStatus, LifecycleError> {
        let mut slot = self.registry.lock(project.id).await;
        let fresh = self.fresh(project.id).await?;
        reconcile(self.store.as_ref(), &fresh, &mut slot).await
    }

    pub async fn status_detailed(&self, project: &Project) -> Result<StatusReport, LifecycleError> {
        let mut slot = self.registry.lock(project.id).await;
        let mut fresh = self.fresh(project.id).await?;
        let status = reconcile(self.store.as_ref(), &fresh, &mut slot).await?;
        if status != fresh.execution_info.status {
            fresh = self.fresh(project.id).await?;
        }

        let pid = match status {
            ExecStatus::Running => slot.tracked().map(|tracked| tracked.pid),
            _ => None,
        };
        let uptime_seconds = match pid {
            Some(pid) => procstat::uptime(pid).await.map(|d| d.as_secs()),
            None => None,
        };

        Ok(StatusReport {
            project_id: fresh.id,
            name: fresh.name,
            status,
            pid,
            uptime_seconds,
            last_run_time: fresh.execution_info.last_run_time,
            exit_code: fresh.execution_info.exit_code,
            run_command: fresh.run_command,
        })
    }

    pub async fn usage(&self, project_id: Uuid) -> Result<Usage, LifecycleError> {
        let mut slot = self.registry.lock(project_id).await;
        let fresh = self.fresh(project_id).await?;
        if reconcile(self.store.as_ref(), &fresh, &mut slot).await? != ExecStatus::Running {
            return Err(LifecycleError::NotRunning);
        }
        let pid = slot
            .tracked()
            .map(|tracked| tracked.pid)
            .ok_or(LifecycleError::NotRunning)?;

        let sample = procstat::sample_over(pid, self.options.timings.usage_sample)
            .await
            .ok_or(LifecycleError::ProcessVanished)?;

        // An exited but unreaped child is still listed by the OS.
        if slot.liveness() != Liveness::Alive(pid) {
            return Err(LifecycleError::ProcessVanished);
        }

        Ok(Usage {
            pid,
            cpu_percent: f64::from(sample.cpu_percent),
            memory_bytes: sample.memory_bytes,
            memory_mb: sample.memory_bytes as f64 / (1024.0 * 1024.0),
        })
    }

    pub async fn install(&self, project: &Project) -> Result<String, LifecycleError> {
        let _slot = self.registry.lock(project.id).await;
        let fresh = self.fresh(project.id).await?;
        if fresh.is_locked {
            return Err(LifecycleError::Locked);
        }

        let preparer = Preparer {
            backend: self.backend.as_ref(),
            sandbox: &self.options.sandbox,
            runtime: &self.options.runtime,
            timeout: self.options.timings.install_timeout,
        };
        preparer.prepare(&fresh).await
    }

    async fn fresh(&self, project_id: Uuid) -> Result<Project, LifecycleError> {
        self.store
            .project(project_id)
            .await?
            .ok_or(LifecycleError::ProjectNotFound)
    }

    async fn start_locked(
        &self,
        project_id: Uuid,
        slot: &mut Slot,
    ) -> Result<StartOutcome, LifecycleError> {
        let project = self.fresh(project_id).await?;
        if project.is_locked {
            return Err(LifecycleError::Locked);
        }
        if reconcile(self.store.as_ref(), &project, slot).await? == ExecStatus::Running {
            return Err(LifecycleError::AlreadyRunning);
        }

        // The bound covers preparation and spawn. A tracked child is always recorded.
        let bound = self.options.timings.start_timeout;
        let pid = tokio::time::timeout(bound, self.spawn(&project, slot))
            .await
            .map_err(|_| LifecycleError::StartTimedOut(bound.as_secs()))??;

        if let Err(e) = self.store.record_start(project.id, pid as i32, Utc::now()).await {
            if let Some(mut tracked) = slot.take() {
                if let Err(kill) = self.terminate(&mut tracked).await {
                    tracing::error!(project_id = %project.id, pid, "Failed to stop unrecorded child: {kill}");
                }
            }
            return Err(e.into());
        }

        tracing::info!(
            project_id = %project.id,
            pid,
            backend = self.backend.name(),
            "Project started"
        );
        Ok(StartOutcome {
            pid,
            ram_mb: project.resource_limits.ram_mb,
        })
    }

    /// Spawn and track the child. Nothing is awaited between spawn and tracking.
    async fn spawn(&self, project: &Project, slot: &mut Slot) -> Result<u32, LifecycleError> {
        let root = project.root();
        let interpreter = interpreter_path(root, &self.options.runtime);
        if !tokio::fs::try_exists(&interpreter).await? {
            return Err(LifecycleError::EnvironmentMissing);
        }

        let plan = launch_plan(project, &self.options.sandbox, &self.options.runtime)?;
        check_entry_script(root, &plan.entry_script).await?;
        let line = self.backend.render(&plan.profile, &plan.interpreter, &plan.args);

        let env = self.process_env(project).await;
        let log = tokio::fs::File::create(project.log_path())
            .await?
            .into_std()
            .await;
        let log_err = log.try_clone()?;

        let child = Command::new(&line.program)
            .args(&line.args)
            .current_dir(root)
            .env_clear()
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .process_group(0)
            .spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("child exited before its pid was read"))?;

        slot.track(Tracked {
            child,
            pid,
            spawned_at: Instant::now(),
        });
        Ok(pid)
    }

    async fn stop_locked(
        &self,
        project_id: Uuid,
        slot: &mut Slot,
    ) -> Result<Option<i32>, LifecycleError> {
        let project = self.fresh(project_id).await?;
        if reconcile(self.store.as_ref(), &project, slot).await? != ExecStatus::Running {
            return Err(LifecycleError::NotRunning);
        }
        let Some(mut tracked) = slot.take() else {
            return Err(LifecycleError::NotRunning);
        };

        let code = match self.terminate(&mut tracked).await {
            Ok(code) => code,
            Err(e) => {
                slot.track(tracked);
                return Err(e);
            }
        };
        self.store.record_stop(project_id, code).await?;

        tracing::info!(
            project_id = %project_id,
            exit_code = ?code,
            ran_for_secs = tracked.spawned_at.elapsed().as_secs(),
            "Project stopped"
        );
        Ok(code)
    }

    /// SIGTERM the process group, then SIGKILL once the grace window passes.
    async fn terminate(&self, tracked: &mut Tracked) -> Result<Option<i32>, LifecycleError> {
        let group = Pid::from_raw(tracked.pid as i32);
        signal_group(group, Signal::SIGTERM);

        let grace = self.options.timings.stop_grace;
        match tokio::time::timeout(grace, tracked.child.wait()).await {
            Ok(status) => Ok(exit_code(status?)),
            Err(_) => {
                tracing::warn!(pid = tracked.pid, "Grace window elapsed, sending SIGKILL");
                signal_group(group, Signal::SIGKILL);
                let _ = tracked.child.start_kill();
                let status = tracked.child.wait().await?;
                Ok(exit_code(status))
            }
        }
    }

    async fn process_env(&self, project: &Project) -> HashMap<String, String> {
        let root = project.root();
        let mut env = HashMap::from([
            ("PATH".to_string(), "/usr/bin:/bin".to_string()),
            ("HOME".to_string(), root.display().to_string()),
            (
                "PYTHONPATH".to_string(),
                self.options.sandbox.safeguard_path.display().to_string(),
            ),
        ]);

        let contents = match tokio::fs::read_to_string(root.join(".env")).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return env,
            Err(e) => {
                tracing::warn!(project_id = %project.id, "Failed to read project .env: {e}");
                return env;
            }
        };
        for item in dotenvy::from_read_iter(contents.as_bytes()) {
            match item {
                Ok((key, value)) => {
                    env.insert(key, value);
                }
                Err(e) => {
                    tracing::warn!(project_id = %project.id, "Skipping invalid .env entry: {e}");
                }
            }
        }
        env
    }
}

fn signal_group(group: Pid, signal: Signal) {
    match killpg(group, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid = %group, "Failed to send {signal:?}: {e}"),
    }
}
