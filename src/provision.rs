//! Project creation from an upload, and project removal.

use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock};

use bytes::Bytes;
use rand::Rng;
use rand::distr::Alphanumeric;
use regex::Regex;
use uuid::Uuid;

use crate::entitlements::QuotaController;
use crate::filebrowser::FileBrowser;
use crate::models::{NewProject, Project};
use crate::runtime::{LifecycleError, Supervisor};
use crate::store::{ProjectStore, StoreError};
use crate::upload::{ProjectUpload, UploadKind};

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]{0,63}$").unwrap());

pub const LOG_FILE: &str = "project.log";
pub const DEFAULT_ENTRY: &str = "main.py";

pub struct Provisioner {
    store: Arc<dyn ProjectStore>,
    supervisor: Arc<Supervisor>,
    quota: Arc<QuotaController>,
    filebrowser: Option<Arc<FileBrowser>>,
    projects_dir: PathBuf,
}

impl Provisioner {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        supervisor: Arc<Supervisor>,
        quota: Arc<QuotaController>,
        filebrowser: Option<Arc<FileBrowser>>,
        projects_dir: PathBuf,
    ) -> Self {
        let projects_dir = std::path::absolute(&projects_dir).unwrap_or(projects_dir);
        Self {
            store,
            supervisor,
            quota,
            filebrowser,
            projects_dir,
        }
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    /// Scope of a project relative to the projects directory, as the file browser sees it.
    pub fn scope_of(&self, project: &Project) -> String {
        project
            .root()
            .strip_prefix(&self.projects_dir)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| format!("{}/{}", project.tenant_id, project.name))
    }

    pub async fn create(
        &self,
        tenant_id: Uuid,
        upload: ProjectUpload,
    ) -> Result<Project, LifecycleError> {
        let _tenant = self.quota.lock_tenant(tenant_id).await;
        let admission = self.quota.admit(tenant_id).await?;

        let name = normalize_name(&upload.name)?;
        let kind = UploadKind::detect(&upload.file_name).ok_or_else(|| {
            LifecycleError::InvalidInput("Upload a .py file or a .zip archive".to_string())
        })?;
        let script_name = match kind {
            UploadKind::Script => Some(safe_file_name(&upload.file_name)?),
            UploadKind::Archive => None,
        };

        let root = self
            .projects_dir
            .join(tenant_id.to_string())
            .join(&name);
        if tokio::fs::try_exists(&root).await? {
            return Err(StoreError::DuplicateName(name).into());
        }
        tokio::fs::create_dir_all(&root).await?;

        let result = async {
            match &script_name {
                Some(file) => tokio::fs::write(root.join(file), &upload.content).await?,
                None => extract_archive(upload.content.clone(), root.clone()).await?,
            }

            let entry = script_name.clone().unwrap_or_else(|| DEFAULT_ENTRY.to_string());
            let id = Uuid::now_v7();
            let new = NewProject {
                id,
                tenant_id,
                name: name.clone(),
                path: root.display().to_string(),
                is_premium: admission.is_premium,
                expiry_date: admission.expiry_date,
                run_command: vec!["python3".to_string(), entry],
                resource_limits: admission.resource_limits.clone(),
                log_file: root.join(LOG_FILE).display().to_string(),
                filebrowser_user: format!("{}_{name}", &tenant_id.simple().to_string()[..8]),
                filebrowser_pass: generate_password(14),
            };
            Ok::<_, LifecycleError>(self.store.insert_project(new).await?)
        }
        .await;

        match result {
            Ok(project) => {
                tracing::info!(
                    project_id = %project.id,
                    tenant_id = %tenant_id,
                    premium = project.is_premium,
                    "Project created"
                );
                Ok(project)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&root).await {
                    tracing::warn!(root = %root.display(), "Failed to remove project root: {cleanup}");
                }
                Err(e)
            }
        }
    }

    /// Stop, drop the file browser account, remove the root and the record. Quota is untouched.
    /// Runs under the project's slot lock, so no start can slip in between.
    pub async fn delete(&self, project: &Project) -> Result<(), LifecycleError> {
        let store = &self.store;
        let filebrowser = &self.filebrowser;
        self.supervisor
            .remove(project.id, move || async move {
                if let Some(filebrowser) = filebrowser {
                    if let Err(e) = filebrowser.remove_user(&project.filebrowser_user).await {
                        tracing::warn!(project_id = %project.id, "Failed to remove file browser user: {e}");
                    }
                }

                match tokio::fs::remove_dir_all(project.root()).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(LifecycleError::from(e)),
                }

                store.delete_project(project.id).await?;
                Ok::<(), LifecycleError>(())
            })
            .await?;

        tracing::info!(project_id = %project.id, "Project deleted");
        Ok(())
    }
}

/// Lowercase, spaces to hyphens, then validated as a path-safe slug.
pub fn normalize_name(raw: &str) -> Result<String, LifecycleError> {
    let name = raw.trim().replace(' ', "-").to_lowercase();
    if NAME_RE.is_match(&name) {
        Ok(name)
    } else {
        Err(LifecycleError::InvalidInput(
            "Project name must be 1-64 characters of lowercase letters, digits, '-' or '_'"
                .to_string(),
        ))
    }
}

fn safe_file_name(raw: &str) -> Result<String, LifecycleError> {
    Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.starts_with('.'))
        .map(str::to_string)
        .ok_or_else(|| LifecycleError::InvalidInput(format!("Invalid file name '{raw}'")))
}

pub fn generate_password(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

async fn extract_archive(content: Bytes, root: PathBuf) -> Result<(), LifecycleError> {
    tokio::task::spawn_blocking(move || extract_archive_blocking(&content, &root))
        .await
        .map_err(|e| LifecycleError::Io(io::Error::other(e)))?
}

/// Extract into `root`. Entries escaping the root are refused. When every entry
/// lives under one top-level folder, that folder is flattened away.
pub fn extract_archive_blocking(content: &[u8], root: &Path) -> Result<(), LifecycleError> {
    let invalid = |e: zip::result::ZipError| {
        LifecycleError::InvalidInput(format!("Not a valid zip archive: {e}"))
    };
    let mut archive = zip::ZipArchive::new(Cursor::new(content)).map_err(invalid)?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let file = archive.by_index(i).map_err(invalid)?;
        let path = file.enclosed_name().ok_or_else(|| {
            LifecycleError::InvalidInput(format!("Archive entry '{}' escapes the project root", file.name()))
        })?;
        entries.push(path);
    }
    let prefix = shared_top_folder(&entries);

    for (i, path) in entries.iter().enumerate() {
        let relative = match &prefix {
            Some(prefix) => path.strip_prefix(prefix).unwrap_or(path),
            None => path.as_path(),
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = root.join(relative);

        let mut file = archive.by_index(i).map_err(invalid)?;
        if file.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&target)?;
        io::copy(&mut file, &mut out)?;
    }
    Ok(())
}

fn shared_top_folder(entries: &[PathBuf]) -> Option<PathBuf> {
    let first = match entries.first()?.components().next()? {
        Component::Normal(name) => PathBuf::from(name),
        _ => return None,
    };
    let mut nested = false;
    for path in entries {
        let mut components = path.components();
        if components.next() != Some(Component::Normal(first.as_os_str())) {
            return None;
        }
        if components.next().is_some() {
            nested = true;
        }
    }
    // A lone file at the top level is not a folder.
    if !nested {
        return None;
    }
    Some(first)
}
