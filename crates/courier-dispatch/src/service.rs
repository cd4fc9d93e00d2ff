use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use courier_bridge::{BridgeRequest, BridgeResponse};
use courier_core::trigger::{interval_seconds, IntervalUnit, Trigger};
use courier_core::types::{new_task_id, now_rfc3339, DestinationId, IdentityId};
use courier_scheduler::SchedulerError;
use courier_store::{ExecutionRecord, Identity, IdentityStats, Task, TaskStatus};

use crate::cascade;
use crate::error::{DispatchError, Result};
use crate::Services;

/// Schedule half of a create/update request, as the API layer submits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleRequest {
    /// Repeat every `primary` × `unit` plus `extra_minutes`.
    Repeat {
        primary: u64,
        unit: IntervalUnit,
        #[serde(default)]
        extra_minutes: u64,
    },
    /// Fire once at the given UTC instant.
    Once { at: DateTime<Utc> },
}

impl ScheduleRequest {
    fn to_trigger(&self) -> Result<Trigger> {
        match self {
            ScheduleRequest::Repeat {
                primary,
                unit,
                extra_minutes,
            } => {
                let every_secs = interval_seconds(*primary, *unit, *extra_minutes);
                if every_secs == 0 {
                    return Err(DispatchError::InvalidRequest(
                        "interval must be at least one minute".into(),
                    ));
                }
                Ok(Trigger::Interval { every_secs })
            }
            ScheduleRequest::Once { at } => Ok(Trigger::OneTime { at: *at }),
        }
    }
}

/// Owner-editable fields of a task, as submitted upward by the API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub name: Option<String>,
    pub message: String,
    /// Attachment paths, already saved to disk by the (excluded) upload
    /// handler. Order is preserved through to delivery.
    #[serde(default)]
    pub attachments: Vec<String>,
    pub targets: Vec<DestinationId>,
    pub schedule: ScheduleRequest,
    pub send_delay_secs: Option<u64>,
}

/// The synchronous operations surface exposed to the API layer.
///
/// Store- and scheduler-only operations run inline on the calling thread.
/// Operations that need the network (`refresh_chats`, `auth_status`) are
/// async, with `*_blocking` wrappers that park the calling thread on the
/// runtime — the explicit, bounded hand-off inbound request threads use.
#[derive(Clone)]
pub struct TaskService {
    svc: Services,
    runtime: tokio::runtime::Handle,
}

impl TaskService {
    pub fn new(svc: Services, runtime: tokio::runtime::Handle) -> Self {
        Self { svc, runtime }
    }

    /// Create a task and register its trigger. Returns the stored task.
    pub fn create_task(&self, identity_id: IdentityId, req: TaskRequest) -> Result<Task> {
        let identity = self.require_identity(identity_id)?;
        let (trigger, targets) = validate(&req)?;

        let status = if trigger.is_one_time() {
            TaskStatus::Scheduled
        } else {
            TaskStatus::Active
        };
        let now = now_rfc3339();
        let task = Task {
            id: new_task_id(),
            identity_id: identity.id,
            name: normalize_name(req.name),
            message: req.message,
            attachments: req.attachments,
            targets,
            trigger: trigger.clone(),
            status,
            running: false,
            execution_count: 0,
            success_count: 0,
            failure_count: 0,
            send_delay_secs: req
                .send_delay_secs
                .unwrap_or(courier_core::config::DEFAULT_SEND_DELAY_SECS),
            last_run: None,
            next_run: None,
            created_at: now.clone(),
            updated_at: now,
        };

        // Row first, trigger second: if the process dies in between, a task
        // without a trigger is visible and re-schedulable, while an orphaned
        // trigger would fire into nothing.
        self.svc.store.insert_task(&task)?;
        let next = self.svc.scheduler.add(&task.id, &trigger)?;
        let mut task = task;
        task.next_run = Some(next.to_rfc3339());
        self.svc.store.update_task(&task)?;

        info!(task_id = %task.id, identity_id, "task created");
        Ok(task)
    }

    /// Replace a task's fields and atomically swap its trigger. Attachment
    /// files dropped by the update are deleted from disk. The task comes out
    /// runnable regardless of its previous status, mirroring the platform
    /// convention that editing a schedule re-arms it.
    pub fn update_task(
        &self,
        identity_id: IdentityId,
        task_id: &str,
        req: TaskRequest,
    ) -> Result<Task> {
        let mut task = self.require_task(identity_id, task_id)?;
        let (trigger, targets) = validate(&req)?;

        remove_dropped_files(&task.attachments, &req.attachments);

        task.name = normalize_name(req.name);
        task.message = req.message;
        task.attachments = req.attachments;
        task.targets = targets;
        task.trigger = trigger.clone();
        task.status = if trigger.is_one_time() {
            TaskStatus::Scheduled
        } else {
            TaskStatus::Active
        };
        if let Some(delay) = req.send_delay_secs {
            task.send_delay_secs = delay;
        }

        let next = self.svc.scheduler.reschedule(&task.id, &trigger)?;
        task.next_run = Some(next.to_rfc3339());
        self.svc.store.update_task(&task)?;

        info!(task_id = %task.id, identity_id, "task updated");
        Ok(task)
    }

    /// Suspend future fires. The in-progress run, if any, is not interrupted
    /// — pausing only prevents the next fire.
    pub fn pause_task(&self, identity_id: IdentityId, task_id: &str) -> Result<()> {
        let task = self.require_task(identity_id, task_id)?;
        match self.svc.scheduler.pause(&task.id) {
            Ok(()) => {}
            // Already absent (e.g. a one-time task that fired): pausing the
            // record alone is still meaningful.
            Err(SchedulerError::EntryNotFound { .. }) => {
                debug!(task_id = %task.id, "pause: no live trigger entry")
            }
            Err(e) => return Err(e.into()),
        }
        self.svc.store.set_task_paused(&task.id)?;
        info!(task_id = %task.id, "task paused");
        Ok(())
    }

    /// Reinstate a paused task. The next fire is computed from the current
    /// time; the pre-pause `next_run` is never reused.
    pub fn resume_task(&self, identity_id: IdentityId, task_id: &str) -> Result<()> {
        let task = self.require_task(identity_id, task_id)?;
        // Replace-semantics add covers both a paused entry and one removed by
        // the invalidation cascade.
        let next = self.svc.scheduler.add(&task.id, &task.trigger)?;
        let status = if task.trigger.is_one_time() {
            TaskStatus::Scheduled
        } else {
            TaskStatus::Active
        };
        self.svc
            .store
            .set_task_resumed(&task.id, status, &next.to_rfc3339())?;
        info!(task_id = %task.id, next_fire = %next, "task resumed");
        Ok(())
    }

    /// Remove the trigger permanently but keep the record for history.
    pub fn archive_task(&self, identity_id: IdentityId, task_id: &str) -> Result<()> {
        let task = self.require_task(identity_id, task_id)?;
        self.svc.scheduler.remove(&task.id)?;
        self.svc.store.set_task_archived(&task.id)?;
        info!(task_id = %task.id, "task archived");
        Ok(())
    }

    /// Bring an archived task back into rotation, like resume.
    pub fn unarchive_task(&self, identity_id: IdentityId, task_id: &str) -> Result<()> {
        self.resume_task(identity_id, task_id)
    }

    /// Delete the record, its trigger, and any attachment files it owned.
    pub fn delete_task(&self, identity_id: IdentityId, task_id: &str) -> Result<()> {
        let task = self.require_task(identity_id, task_id)?;
        self.svc.scheduler.remove(&task.id)?;
        remove_dropped_files(&task.attachments, &[]);
        self.svc.store.delete_task(&task.id)?;
        info!(task_id = %task.id, "task deleted");
        Ok(())
    }

    pub fn get_task(&self, identity_id: IdentityId, task_id: &str) -> Result<Task> {
        self.require_task(identity_id, task_id)
    }

    pub fn list_tasks(&self, identity_id: IdentityId) -> Result<Vec<Task>> {
        Ok(self.svc.store.list_tasks(identity_id)?)
    }

    pub fn list_archived_tasks(&self, identity_id: IdentityId) -> Result<Vec<Task>> {
        Ok(self.svc.store.list_archived_tasks(identity_id)?)
    }

    pub fn task_history(&self, identity_id: IdentityId, task_id: &str) -> Result<Vec<ExecutionRecord>> {
        let task = self.require_task(identity_id, task_id)?;
        Ok(self.svc.store.list_executions(&task.id, 50)?)
    }

    pub fn stats(&self, identity_id: IdentityId) -> Result<IdentityStats> {
        Ok(self.svc.store.identity_stats(identity_id)?)
    }

    // ── network-touching operations ──────────────────────────────────────────

    /// Immediate chat-list refresh: one reconcile pass now. Returns the
    /// number of active bindings afterwards.
    pub async fn refresh_chats(&self, identity_id: IdentityId) -> Result<u64> {
        let identity = self.require_identity(identity_id)?;
        match crate::reconciler::reconcile_once(&self.svc, &identity).await {
            Ok(count) => Ok(count),
            Err(e) if is_auth(&e) => {
                cascade::invalidate(&self.svc, identity_id)?;
                Err(DispatchError::NotAuthorized { id: identity_id })
            }
            Err(e) => Err(e),
        }
    }

    /// Blocking wrapper for non-async API threads.
    pub fn refresh_chats_blocking(&self, identity_id: IdentityId) -> Result<u64> {
        self.runtime.block_on(self.refresh_chats(identity_id))
    }

    /// Probe the stored credential against the platform. A dead credential
    /// triggers the invalidation cascade and reports unauthorized.
    pub async fn auth_status(&self, identity_id: IdentityId) -> Result<bool> {
        let identity = self.require_identity(identity_id)?;
        let Some(blob) = identity.credential.as_deref() else {
            return Ok(false);
        };
        let credential = self.svc.codec.decrypt(blob)?;

        let authorized = match self
            .svc
            .bridge
            .submit(identity_id, BridgeRequest::CheckAuthorized { credential })
            .await
        {
            Ok(BridgeResponse::Authorized(ok)) => ok,
            Ok(other) => {
                warn!(identity_id, reply = ?other, "unexpected bridge reply for auth probe");
                return Err(DispatchError::InvalidRequest(
                    "bridge returned mismatched reply".into(),
                ));
            }
            Err(e) if e.is_auth_revoked() => false,
            Err(e) => return Err(e.into()),
        };

        if !authorized {
            cascade::invalidate(&self.svc, identity_id)?;
        }
        Ok(authorized)
    }

    /// Blocking wrapper for non-async API threads.
    pub fn auth_status_blocking(&self, identity_id: IdentityId) -> Result<bool> {
        self.runtime.block_on(self.auth_status(identity_id))
    }

    // ── private helpers ──────────────────────────────────────────────────────

    fn require_identity(&self, identity_id: IdentityId) -> Result<Identity> {
        self.svc
            .store
            .get_identity(identity_id)?
            .ok_or(DispatchError::IdentityNotFound { id: identity_id })
    }

    fn require_task(&self, identity_id: IdentityId, task_id: &str) -> Result<Task> {
        self.svc
            .store
            .get_task_owned(task_id, identity_id)?
            .ok_or_else(|| DispatchError::TaskNotFound {
                id: task_id.to_string(),
            })
    }
}

/// Shared create/update validation: a trigger from the schedule request and a
/// deduplicated target list (first occurrence order kept, so executions stay
/// deterministic).
fn validate(req: &TaskRequest) -> Result<(Trigger, Vec<DestinationId>)> {
    if req.message.trim().is_empty() && req.attachments.is_empty() {
        return Err(DispatchError::InvalidRequest(
            "message or attachments required".into(),
        ));
    }
    let mut seen = std::collections::HashSet::new();
    let targets: Vec<DestinationId> = req
        .targets
        .iter()
        .copied()
        .filter(|t| seen.insert(*t))
        .collect();
    if targets.is_empty() {
        return Err(DispatchError::InvalidRequest(
            "at least one destination required".into(),
        ));
    }
    Ok((req.schedule.to_trigger()?, targets))
}

fn normalize_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

/// Delete files present in `before` but not in `after`. Missing files are
/// fine — the upload handler may have cleaned them already.
fn remove_dropped_files(before: &[String], after: &[String]) {
    for path in before {
        if !after.contains(path) {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(%path, "attachment file removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(%path, error = %e, "could not remove attachment file"),
            }
        }
    }
}

fn is_auth(e: &DispatchError) -> bool {
    match e {
        DispatchError::Bridge(b) => b.is_auth_revoked(),
        DispatchError::Channel(c) => c.is_auth_revoked(),
        _ => false,
    }
}
