//! Payment success callbacks. Checkout itself happens elsewhere.

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::auth::extractor::AuthTenant;
use crate::entitlements::QuotaChange;
use crate::error::AppError;
use crate::middleware::audit;
use crate::models::{AuditResource, Project};
use crate::state::SharedState;

pub async fn purchase_slot(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QuotaChange>, AppError> {
    auth.require_system_admin()?;
    let change = state.quota.purchase_slot(id).await?;

    audit::log_event(
        &state.pool,
        id,
        &auth,
        "billing.slot_purchased",
        AuditResource::Tenant(id),
        Some(serde_json::json!({ "project_quota": change.project_quota })),
    )
    .await;

    Ok(Json(change))
}

pub async fn renew(
    auth: AuthTenant,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, AppError> {
    auth.require_system_admin()?;
    let project = state.entitlements.renew(id).await?;

    audit::log_event(
        &state.pool,
        project.tenant_id,
        &auth,
        "billing.project_renewed",
        AuditResource::Project(id),
        Some(serde_json::json!({ "expiry_date": project.expiry_date })),
    )
    .await;

    Ok(Json(project))
}
