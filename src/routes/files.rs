use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::auth::extractor::AuthTenant;
use crate::error::AppError;
use crate::filebrowser::FileSession;
use crate::middleware::audit;
use crate::models::AuditResource;
use crate::routes::projects::swept_project;
use crate::runtime::LifecycleError;
use crate::state::SharedState;

/// Hand out credentials for the project's file browser account, creating it on first use.
pub async fn open_session(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FileSession>, AppError> {
    let filebrowser = state.filebrowser.clone().ok_or_else(|| {
        AppError::Unavailable("File browser is not configured".to_string())
    })?;

    let project = swept_project(&state, &auth, id).await?;
    if project.is_locked {
        return Err(LifecycleError::Locked.into());
    }

    let scope = state.provisioner.scope_of(&project);
    let session = filebrowser
        .ensure_user(&project.filebrowser_user, &project.filebrowser_pass, &scope)
        .await?;

    audit::log_event(
        &state.pool,
        project.tenant_id,
        &auth,
        "project.files_opened",
        AuditResource::Project(id),
        None,
    )
    .await;

    Ok(Json(session))
}
