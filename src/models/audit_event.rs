use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    /// Tenant whose tenant or project the event concerns.
    pub tenant_id: Uuid,
    /// Tenant that performed the action. Differs from `tenant_id` for admin actions.
    pub actor_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Uuid,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// What an audit event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditResource {
    Tenant(Uuid),
    Project(Uuid),
}

impl AuditResource {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditResource::Tenant(_) => "tenant",
            AuditResource::Project(_) => "project",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            AuditResource::Tenant(id) | AuditResource::Project(id) => *id,
        }
    }
}
