use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::extractor::AuthTenant;
use crate::db::audit::AuditQuery;
use crate::models::AuditResource;

/// Record a mutation after it succeeded. Failures are logged, never returned.
/// `tenant_id` is the tenant the change applies to; the actor is the caller.
pub async fn log_event(
    pool: &PgPool,
    tenant_id: Uuid,
    actor: &AuthTenant,
    action: &str,
    resource: AuditResource,
    details: Option<serde_json::Value>,
) {
    if let Err(e) =
        crate::db::audit::insert(pool, tenant_id, actor.tenant_id, action, resource, details).await
    {
        tracing::error!(action, resource_id = %resource.id(), "Failed to log audit event: {e}");
    }
}

/// `?limit=&offset=` for audit listings.
#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

impl Page {
    pub fn query(&self, tenant_id: Uuid, project_id: Option<Uuid>) -> AuditQuery {
        AuditQuery {
            tenant_id,
            project_id,
            limit: self.limit.clamp(1, 200),
            offset: self.offset.max(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_is_clamped() {
        let tenant = Uuid::now_v7();
        let query = Page { limit: 10_000, offset: -5 }.query(tenant, None);
        assert_eq!(query.limit, 200);
        assert_eq!(query.offset, 0);
        assert_eq!(Page { limit: 0, offset: 3 }.query(tenant, None).limit, 1);
    }

    #[test]
    fn resource_kind_and_id() {
        let id = Uuid::now_v7();
        assert_eq!(AuditResource::Project(id).kind(), "project");
        assert_eq!(AuditResource::Tenant(id).kind(), "tenant");
        assert_eq!(AuditResource::Project(id).id(), id);
    }
}
