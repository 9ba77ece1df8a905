use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::LifecycleError;
use super::profile::{interpreter_path, isolation_profile};
use super::sandbox::SandboxBackend;
use crate::config::{RuntimeSettings, SandboxSettings};
use crate::models::Project;

const DIAGNOSTIC_LIMIT: usize = 3000;
pub const INSTALL_ERROR_LOG: &str = "installation_error.log";

pub struct Preparer<'a> {
    pub backend: &'a dyn SandboxBackend,
    pub sandbox: &'a SandboxSettings,
    pub runtime: &'a RuntimeSettings,
    pub timeout: Duration,
}

impl Preparer<'_> {
    /// Create the project environment if needed and install its manifest.
    /// Never touches the persisted project record.
    pub async fn prepare(&self, project: &Project) -> Result<String, LifecycleError> {
        match tokio::time::timeout(self.timeout, self.run(project)).await {
            Ok(result) => result,
            Err(_) => Err(LifecycleError::InstallFailed(format!(
                "timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn run(&self, project: &Project) -> Result<String, LifecycleError> {
        let root = project.root();
        let env_path = root.join(&self.runtime.env_dir);

        if !tokio::fs::try_exists(&env_path).await? {
            self.create_environment(root, &env_path).await?;
            tracing::info!(project_id = %project.id, "Runtime environment created");
        }

        let manifest = root.join(&self.runtime.manifest);
        if !tokio::fs::try_exists(&manifest).await? {
            return Ok("Runtime environment is ready. No dependency manifest found.".to_string());
        }

        let interpreter = interpreter_path(root, self.runtime);
        if !tokio::fs::try_exists(&interpreter).await? {
            return Err(LifecycleError::EnvironmentMissing);
        }

        // Installs always get network access, regardless of the run setting.
        let profile = isolation_profile(project, self.sandbox, true);
        let mut args = self.runtime.install_args.clone();
        args.push(self.runtime.manifest.clone());
        let line = self.backend.render(&profile, &interpreter, &args);

        let output = Command::new(&line.program)
            .args(&line.args)
            .current_dir(root)
            .env_clear()
            .env("PATH", "/usr/bin:/bin")
            .env("HOME", root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LifecycleError::InstallFailed(format!("failed to run installer: {e}")))?;

        if output.status.success() {
            tracing::info!(project_id = %project.id, "Dependencies installed");
            return Ok("Runtime environment is ready. Dependencies installed.".to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if let Err(e) = tokio::fs::write(root.join(INSTALL_ERROR_LOG), stderr.as_bytes()).await {
            tracing::warn!(project_id = %project.id, "Failed to write installation log: {e}");
        }
        tracing::warn!(project_id = %project.id, status = %output.status, "Dependency installation failed");
        Err(LifecycleError::InstallFailed(tail(&stderr, DIAGNOSTIC_LIMIT)))
    }

    async fn create_environment(&self, root: &Path, env_path: &Path) -> Result<(), LifecycleError> {
        let Some((program, args)) = self.runtime.create_command.split_first() else {
            return Err(LifecycleError::EnvironmentSetup(
                "no environment create command configured".to_string(),
            ));
        };

        let output = Command::new(program)
            .args(args)
            .arg(env_path)
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LifecycleError::EnvironmentSetup(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LifecycleError::EnvironmentSetup(tail(&stderr, DIAGNOSTIC_LIMIT)));
        }
        Ok(())
    }
}

/// Last `limit` characters of `text`.
pub fn tail(text: &str, limit: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(limit)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        assert_eq!(tail("ééé", 2), "éé");
    }
}
