use tracing::{info, warn};

use courier_core::types::IdentityId;

use crate::error::Result;
use crate::Services;

/// The credential invalidation cascade.
///
/// Invoked whenever any remote call signals the stored credential is dead:
/// clears the credential and authorized flag, pauses every runnable task the
/// identity owns (one store transaction), then drops the paused tasks'
/// scheduler entries and retires the identity's bridge worker.
///
/// Idempotent — a second call on an already-invalidated identity finds
/// nothing to change and returns quietly.
///
/// Entry removal happens after the store commit. If the process dies in
/// between, the orphaned trigger still fires but the guard refuses the run
/// (the task is paused), so the system converges anyway.
pub fn invalidate(svc: &Services, identity_id: IdentityId) -> Result<usize> {
    let paused = svc.store.invalidate_identity(identity_id)?;

    for task_id in &paused {
        if let Err(e) = svc.scheduler.remove(task_id) {
            warn!(task_id = %task_id, error = %e, "failed to drop trigger for paused task");
        }
    }
    svc.bridge.retire_worker(identity_id);

    if !paused.is_empty() {
        info!(
            identity_id,
            paused = paused.len(),
            "credential invalidated, active tasks paused"
        );
    }
    Ok(paused.len())
}
