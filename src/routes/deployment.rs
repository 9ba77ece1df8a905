use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::extractor::AuthTenant;
use crate::error::AppError;
use crate::middleware::audit;
use crate::models::AuditResource;
use crate::routes::projects::{owned_project, swept_project};
use crate::runtime::{StartOutcome, Usage};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub detailed: bool,
}

fn check_action_limit(state: &SharedState, id: Uuid) -> Result<(), AppError> {
    state.action_limiter.check(id).map_err(|retry| {
        AppError::RateLimited(format!("Too many actions on this project, retry in {retry}s"))
    })
}

pub async fn install(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project = swept_project(&state, &auth, id).await?;
    check_action_limit(&state, id)?;

    let message = state.supervisor.install(&project).await?;

    audit::log_event(
        &state.pool,
        project.tenant_id,
        &auth,
        "project.installed",
        AuditResource::Project(id),
        None,
    )
    .await;

    Ok(Json(json!({ "message": message })))
}

pub async fn start(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StartOutcome>, AppError> {
    let project = swept_project(&state, &auth, id).await?;
    check_action_limit(&state, id)?;

    let outcome = state.supervisor.start(&project).await?;

    audit::log_event(
        &state.pool,
        project.tenant_id,
        &auth,
        "project.started",
        AuditResource::Project(id),
        Some(json!({ "pid": outcome.pid })),
    )
    .await;

    Ok(Json(outcome))
}

pub async fn stop(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let project = owned_project(&state, &auth, id).await?;
    let exit_code = state.supervisor.stop(id).await?;

    audit::log_event(
        &state.pool,
        project.tenant_id,
        &auth,
        "project.stopped",
        AuditResource::Project(id),
        Some(json!({ "exit_code": exit_code })),
    )
    .await;

    Ok(Json(json!({ "status": "stopped", "exit_code": exit_code })))
}

pub async fn restart(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StartOutcome>, AppError> {
    let project = swept_project(&state, &auth, id).await?;
    check_action_limit(&state, id)?;

    let outcome = state.supervisor.restart(&project).await?;

    audit::log_event(
        &state.pool,
        project.tenant_id,
        &auth,
        "project.restarted",
        AuditResource::Project(id),
        Some(json!({ "pid": outcome.pid })),
    )
    .await;

    Ok(Json(outcome))
}

pub async fn status(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> Result<Response, AppError> {
    let project = owned_project(&state, &auth, id).await?;
    if query.detailed {
        let report = state.supervisor.status_detailed(&project).await?;
        return Ok(Json(report).into_response());
    }
    let status = state.supervisor.status(&project).await?;
    Ok(Json(json!({ "project_id": id, "status": status })).into_response())
}

pub async fn usage(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Usage>, AppError> {
    owned_project(&state, &auth, id).await?;
    let usage = state.supervisor.usage(id).await?;
    Ok(Json(usage))
}

pub async fn logs(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let project = owned_project(&state, &auth, id).await?;

    let content = match tokio::fs::read(project.log_path()).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(AppError::Internal(format!("Failed to read log file: {e}"))),
    };
    if content.is_empty() {
        return Err(AppError::NotFound("No logs yet".to_string()));
    }

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        content,
    )
        .into_response())
}
