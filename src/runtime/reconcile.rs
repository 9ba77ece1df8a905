use super::LifecycleError;
use super::registry::{Liveness, Slot};
use crate::models::{ExecStatus, Project};
use crate::store::ProjectStore;

/// Bring the persisted record in line with what the slot actually holds.
///
/// Must be called with the slot lock held and a record read under that lock.
/// At most one transition is taken per call, and only `running` records are
/// ever moved to `crashed`.
pub async fn reconcile(
    store: &dyn ProjectStore,
    project: &Project,
    slot: &mut Slot,
) -> Result<ExecStatus, LifecycleError> {
    let persisted = project.execution_info.status;

    match slot.liveness() {
        Liveness::Alive(_) => Ok(ExecStatus::Running),
        Liveness::Exited(exit_code) => {
            slot.take();
            if store.record_crash(project.id, exit_code).await? {
                tracing::warn!(
                    project_id = %project.id,
                    exit_code = ?exit_code,
                    "Project process exited unexpectedly"
                );
                Ok(ExecStatus::Crashed)
            } else {
                Ok(persisted)
            }
        }
        Liveness::Absent if project.execution_info.is_running => {
            if store.record_crash(project.id, None).await? {
                tracing::warn!(
                    project_id = %project.id,
                    "Project recorded as running but no process is tracked"
                );
                Ok(ExecStatus::Crashed)
            } else {
                Ok(persisted)
            }
        }
        Liveness::Absent => Ok(persisted),
    }
}
