use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use courier_bridge::{BatchReport, BridgeRequest, BridgeResponse};
use courier_scheduler::FiredJob;
use courier_store::{RunOutcome, Task, TaskStatus};

use crate::cascade;
use crate::error::Result;
use crate::guard::ExecutionGuard;
use crate::notify;
use crate::Services;

/// Receives fired jobs from the scheduler engine and runs them.
///
/// Each fire executes in its own spawned task: different tasks proceed
/// concurrently, same-task overlap is excluded by the guard, and same-identity
/// sends serialize behind the identity's bridge worker.
pub struct Executor {
    svc: Services,
}

impl Executor {
    pub fn new(svc: Services) -> Self {
        Self { svc }
    }

    /// Main loop. Exits when the fired channel closes or `shutdown` flips.
    pub async fn run(self, mut fired_rx: mpsc::Receiver<FiredJob>, mut shutdown: watch::Receiver<bool>) {
        info!("executor started");
        loop {
            tokio::select! {
                maybe = fired_rx.recv() => {
                    match maybe {
                        Some(job) => {
                            let svc = self.svc.clone();
                            tokio::spawn(async move {
                                if let Err(e) = execute_task(&svc, &job.task_id).await {
                                    // Contained: one run's failure never stops
                                    // the executor for other tasks.
                                    error!(task_id = %job.task_id, error = %e, "task execution failed");
                                }
                            });
                        }
                        None => {
                            info!("executor exiting (fired channel closed)");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("executor shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Run one fired task end to end.
///
/// Every path out of this function after the guard is taken goes through
/// `finish` or `abort` — leaking the latch would deadlock the task forever.
pub async fn execute_task(svc: &Services, task_id: &str) -> Result<()> {
    let guard = ExecutionGuard::new(std::sync::Arc::clone(&svc.store));
    if !guard.attempt_start(task_id)? {
        // Already running, paused meanwhile, or deleted: silently skip.
        return Ok(());
    }

    let task = match svc.store.get_task(task_id)? {
        Some(t) => t,
        None => {
            // Row deleted under a still-registered trigger: drop the trigger
            // so it stops firing. Latch released first — nothing after it may
            // prevent that.
            warn!(task_id = %task_id, "fired task no longer exists, removing trigger");
            guard.abort(task_id)?;
            svc.scheduler.remove(task_id)?;
            return Ok(());
        }
    };

    let identity = match svc.store.get_identity(task.identity_id)? {
        Some(i) => i,
        None => {
            warn!(task_id = %task_id, "task owner vanished, removing trigger");
            guard.abort(task_id)?;
            svc.scheduler.remove(task_id)?;
            return Ok(());
        }
    };

    let Some(blob) = identity.credential.clone() else {
        // No credential on file: make sure the rest of the identity's tasks
        // are paused too, then bail without counting an execution.
        debug!(task_id = %task_id, identity_id = identity.id, "no credential, invalidating");
        guard.abort(task_id)?;
        cascade::invalidate(svc, identity.id)?;
        return Ok(());
    };

    let credential = match svc.codec.decrypt(&blob) {
        Ok(c) => c,
        Err(e) => {
            error!(task_id = %task_id, error = %e, "credential decrypt failed");
            guard.abort(task_id)?;
            return Err(e.into());
        }
    };

    let total = task.targets.len() as u64;
    let report = match svc
        .bridge
        .submit(
            identity.id,
            BridgeRequest::SendBatch {
                credential,
                targets: task.targets.clone(),
                message: task.message.clone(),
                attachments: task.attachments.clone(),
                delay: Duration::from_secs(task.send_delay_secs),
            },
        )
        .await
    {
        Ok(BridgeResponse::Batch(report)) => report,
        Ok(other) => {
            warn!(task_id = %task_id, reply = ?other, "unexpected bridge reply for send batch");
            BatchReport {
                sent: 0,
                failed: total,
                auth_revoked: false,
            }
        }
        Err(e) if e.is_auth_revoked() => BatchReport {
            sent: 0,
            failed: total,
            auth_revoked: true,
        },
        Err(e) => {
            // Session-level transient failure (connect, timeout): the whole
            // batch counts failed, the task stays scheduled.
            warn!(task_id = %task_id, error = %e, "send batch failed");
            BatchReport {
                sent: 0,
                failed: total,
                auth_revoked: false,
            }
        }
    };

    // From here to `finish` nothing may early-return: the latch must be
    // released with the outcome below even if these bookkeeping steps fail.
    if report.auth_revoked {
        if let Err(e) = cascade::invalidate(svc, identity.id) {
            error!(task_id = %task_id, error = %e, "invalidation after revoked send failed");
        }
    }

    // For repeating tasks the engine advanced the trigger before forwarding
    // the fire; read the fresh value back. Auth revocation removed the entry,
    // so the task keeps next_run = NULL.
    let next_run = if report.auth_revoked {
        None
    } else {
        svc.scheduler.next_fire(task_id).unwrap_or_else(|e| {
            warn!(task_id = %task_id, error = %e, "could not read next fire time");
            None
        })
    };

    let new_status = if task.trigger.is_one_time() {
        Some(if report.sent > 0 {
            TaskStatus::Sent
        } else {
            TaskStatus::Failed
        })
    } else {
        None
    };

    let ordinal = task.execution_count + 1;
    guard.finish(
        task_id,
        &RunOutcome {
            sent: report.sent,
            failed: report.failed,
            next_run,
            new_status,
        },
    )?;
    record_history(svc, &task, &report);

    info!(
        task_id = %task_id,
        sent = report.sent,
        failed = report.failed,
        run = ordinal,
        "task executed"
    );

    notify::dispatch(svc, &identity, &task, &report, ordinal);
    Ok(())
}

fn record_history(svc: &Services, task: &Task, report: &BatchReport) {
    let outcome = if report.failed == 0 && report.sent > 0 {
        "success"
    } else if report.sent > 0 {
        "partial"
    } else {
        "failed"
    };
    let error = report.auth_revoked.then_some("credential revoked");
    if let Err(e) = svc.store.record_execution(
        &task.id,
        outcome,
        report.sent + report.failed,
        report.sent,
        report.failed,
        error,
    ) {
        warn!(task_id = %task.id, error = %e, "failed to append execution history");
    }
}
