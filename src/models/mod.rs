pub mod audit_event;
pub mod project;
pub mod tenant;

pub use audit_event::{AuditEvent, AuditResource};
pub use project::{ExecStatus, ExecutionInfo, NewProject, Project, ResourceLimits};
pub use tenant::Tenant;
