use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::extractor::AuthTenant;
use crate::db;
use crate::entitlements::QuotaChange;
use crate::error::AppError;
use crate::middleware::audit;
use crate::models::{AuditEvent, AuditResource, Project, Tenant};
use crate::state::SharedState;

#[derive(Serialize)]
pub struct Stats {
    pub tenants: i64,
    pub premium_tenants: i64,
    pub projects: i64,
    pub premium_projects: i64,
    pub running_projects: i64,
}

#[derive(Serialize)]
pub struct TenantDetail {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub projects: Vec<Project>,
}


pub async fn stats(
    auth: AuthTenant,
    State(state): State<SharedState>,
) -> Result<Json<Stats>, AppError> {
    auth.require_system_admin()?;
    let tenants = db::tenants::count_all(&state.pool).await?;
    let premium_tenants =
        db::tenants::count_above_quota(&state.pool, state.config.tiers.free_quota).await?;
    let counts = db::projects::counts(&state.pool).await?;
    Ok(Json(Stats {
        tenants,
        premium_tenants,
        projects: counts.projects,
        premium_projects: counts.premium_projects,
        running_projects: counts.running_projects,
    }))
}

pub async fn list_tenants(
    auth: AuthTenant,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Tenant>>, AppError> {
    auth.require_system_admin()?;
    let tenants = db::tenants::list(&state.pool).await?;
    Ok(Json(tenants))
}

pub async fn get_tenant(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TenantDetail>, AppError> {
    auth.require_system_admin()?;
    let tenant = db::tenants::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Tenant not found".to_string()))?;
    let projects = state.entitlements.sweep(id).await?;
    Ok(Json(TenantDetail { tenant, projects }))
}

pub async fn tenant_audit(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(page): Query<audit::Page>,
) -> Result<Json<Vec<AuditEvent>>, AppError> {
    auth.require_system_admin()?;
    let events = db::audit::list(&state.pool, &page.query(id, None)).await?;
    Ok(Json(events))
}

pub async fn grant_quota(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QuotaChange>, AppError> {
    auth.require_system_admin()?;
    let change = state.quota.grant(id).await?;

    audit::log_event(
        &state.pool,
        id,
        &auth,
        "quota.granted",
        AuditResource::Tenant(id),
        Some(serde_json::json!({
            "project_quota": change.project_quota,
            "unlocked_project": change.affected_project,
        })),
    )
    .await;

    Ok(Json(change))
}

pub async fn revoke_quota(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QuotaChange>, AppError> {
    auth.require_system_admin()?;
    let change = state.quota.revoke(id).await?;

    audit::log_event(
        &state.pool,
        id,
        &auth,
        "quota.revoked",
        AuditResource::Tenant(id),
        Some(serde_json::json!({
            "project_quota": change.project_quota,
            "locked_project": change.affected_project,
        })),
    )
    .await;

    Ok(Json(change))
}
