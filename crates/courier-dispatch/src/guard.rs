use std::sync::Arc;

use courier_store::{RunOutcome, Store};

use crate::error::Result;

/// The single-flight lock around task execution.
///
/// Thin facade over the store's conditional update: the latch has to live in
/// the durable store (not in memory) because the host may run several
/// executor workers, or crash mid-run and recover in a new process.
#[derive(Clone)]
pub struct ExecutionGuard {
    store: Arc<Store>,
}

impl ExecutionGuard {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Try to take the lock. True means this caller owns the run; false is a
    /// silent no-op for the caller (another run is in flight, or the task is
    /// not in a runnable state).
    pub fn attempt_start(&self, task_id: &str) -> Result<bool> {
        Ok(self.store.try_begin_run(task_id)?)
    }

    /// Release the lock and record the run's outcome. Must be reached on
    /// every exit path of the execution routine — a leaked latch deadlocks
    /// the task permanently.
    pub fn finish(&self, task_id: &str, outcome: &RunOutcome) -> Result<()> {
        Ok(self.store.finish_run(task_id, outcome)?)
    }

    /// Release the lock without recording an execution (the run aborted
    /// before anything was attempted).
    pub fn abort(&self, task_id: &str) -> Result<()> {
        Ok(self.store.clear_running(task_id)?)
    }
}
