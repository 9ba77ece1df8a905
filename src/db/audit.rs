use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{AuditEvent, AuditResource};

/// One page of a tenant's events, optionally narrowed to one project.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub tenant_id: Uuid,
    pub project_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

pub async fn insert(
    pool: &PgPool,
    tenant_id: Uuid,
    actor_id: Uuid,
    action: &str,
    resource: AuditResource,
    details: Option<serde_json::Value>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO audit_events (tenant_id, actor_id, action, resource_type, resource_id, details)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(tenant_id)
    .bind(actor_id)
    .bind(action)
    .bind(resource.kind())
    .bind(resource.id())
    .bind(details)
    .execute(pool)
    .await?;
    Ok(())
}

/// Newest first. Ties on `created_at` are broken by id.
pub async fn list(pool: &PgPool, query: &AuditQuery) -> Result<Vec<AuditEvent>, sqlx::Error> {
    sqlx::query_as::<_, AuditEvent>(
        "SELECT * FROM audit_events
         WHERE tenant_id = $1
           AND ($2::uuid IS NULL OR (resource_type = 'project' AND resource_id = $2))
         ORDER BY created_at DESC, id DESC
         LIMIT $3 OFFSET $4",
    )
    .bind(query.tenant_id)
    .bind(query.project_id)
    .bind(query.limit)
    .bind(query.offset)
    .fetch_all(pool)
    .await
}
