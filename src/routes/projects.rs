use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::extractor::AuthTenant;
use crate::db;
use crate::error::AppError;
use crate::middleware::audit;
use crate::models::{AuditEvent, AuditResource, Project};
use crate::runtime::LifecycleError;
use crate::runtime::profile::entry_script;
use crate::state::SharedState;
use crate::upload::parse_project_upload;

#[derive(Deserialize)]
pub struct UpdateCommand {
    pub run_command: Vec<String>,
}

/// Load a project the caller is allowed to act on.
pub(crate) async fn owned_project(
    state: &SharedState,
    auth: &AuthTenant,
    id: Uuid,
) -> Result<Project, AppError> {
    let project = state
        .store
        .project(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;
    auth.require_owner(&project)?;
    Ok(project)
}

/// Like [`owned_project`], with the owner's expired entitlements applied first.
pub(crate) async fn swept_project(
    state: &SharedState,
    auth: &AuthTenant,
    id: Uuid,
) -> Result<Project, AppError> {
    let project = owned_project(state, auth, id).await?;
    state
        .entitlements
        .sweep(project.tenant_id)
        .await?
        .into_iter()
        .find(|p| p.id == id)
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))
}

pub async fn list(
    auth: AuthTenant,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Project>>, AppError> {
    let projects = state.entitlements.sweep(auth.tenant_id).await?;
    Ok(Json(projects))
}

pub async fn create(
    auth: AuthTenant,
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Project>), AppError> {
    let upload = parse_project_upload(&headers, body)
        .await
        .map_err(AppError::BadRequest)?;

    let project = state.provisioner.create(auth.tenant_id, upload).await?;

    audit::log_event(
        &state.pool,
        project.tenant_id,
        &auth,
        "project.created",
        AuditResource::Project(project.id),
        Some(serde_json::json!({ "name": project.name, "premium": project.is_premium })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, AppError> {
    let project = swept_project(&state, &auth, id).await?;
    Ok(Json(project))
}

pub async fn update_command(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCommand>,
) -> Result<Json<Project>, AppError> {
    let project = swept_project(&state, &auth, id).await?;
    if project.is_locked {
        return Err(LifecycleError::Locked.into());
    }

    let run_command: Vec<String> = req
        .run_command
        .into_iter()
        .map(|arg| arg.trim().to_string())
        .filter(|arg| !arg.is_empty())
        .collect();
    if entry_script(&run_command).is_none() {
        return Err(AppError::BadRequest(
            "Run command needs an interpreter followed by an entry script".to_string(),
        ));
    }

    state.store.set_run_command(id, &run_command).await?;

    audit::log_event(
        &state.pool,
        project.tenant_id,
        &auth,
        "project.command_updated",
        AuditResource::Project(id),
        Some(serde_json::json!({ "run_command": run_command })),
    )
    .await;

    let updated = owned_project(&state, &auth, id).await?;
    Ok(Json(updated))
}

pub async fn delete(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project = owned_project(&state, &auth, id).await?;
    state.provisioner.delete(&project).await?;

    audit::log_event(
        &state.pool,
        project.tenant_id,
        &auth,
        "project.deleted",
        AuditResource::Project(id),
        Some(serde_json::json!({ "name": project.name })),
    )
    .await;

    Ok(Json(serde_json::json!({ "message": "Deleted" })))
}

/// The owner's audit trail for one project, newest first.
pub async fn audit_trail(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(page): Query<audit::Page>,
) -> Result<Json<Vec<AuditEvent>>, AppError> {
    let project = owned_project(&state, &auth, id).await?;
    let events = db::audit::list(&state.pool, &page.query(project.tenant_id, Some(id))).await?;
    Ok(Json(events))
}
