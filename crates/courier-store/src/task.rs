use rusqlite::params;
use tracing::debug;

use courier_core::types::{now_rfc3339, DestinationId, IdentityId};

use crate::db::{row_to_execution, row_to_task, TASK_COLUMNS};
use crate::error::{Result, StoreError};
use crate::types::{ExecutionRecord, IdentityStats, RunOutcome, Task, TaskStatus};

impl crate::Store {
    /// Insert a fully-populated task row.
    pub fn insert_task(&self, task: &Task) -> Result<()> {
        let trigger_json = to_json(&task.trigger)?;
        let attachments_json = to_json(&task.attachments)?;
        let targets_json = to_json(&task.targets)?;
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO tasks (
                id, identity_id, name, message, attachments, targets, trigger,
                status, running, execution_count, success_count, failure_count,
                send_delay_secs, last_run, next_run, created_at, updated_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
            params![
                task.id,
                task.identity_id,
                task.name,
                task.message,
                attachments_json,
                targets_json,
                trigger_json,
                task.status.to_string(),
                task.running as i64,
                task.execution_count,
                task.success_count,
                task.failure_count,
                task.send_delay_secs,
                task.last_run,
                task.next_run,
                task.created_at,
                task.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let db = self.db.lock().unwrap();
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
        match db.query_row(&sql, params![id], row_to_task) {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Ownership-checked fetch: `None` when the task does not exist *or*
    /// belongs to a different identity, so callers cannot leak cross-identity
    /// task state by guessing ids.
    pub fn get_task_owned(&self, id: &str, identity_id: IdentityId) -> Result<Option<Task>> {
        let db = self.db.lock().unwrap();
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND identity_id = ?2");
        match db.query_row(&sql, params![id, identity_id], row_to_task) {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Persist every owner-editable field of an existing task. Counters and
    /// the running latch are deliberately excluded — those move only through
    /// the run lifecycle methods below.
    pub fn update_task(&self, task: &Task) -> Result<()> {
        let trigger_json = to_json(&task.trigger)?;
        let attachments_json = to_json(&task.attachments)?;
        let targets_json = to_json(&task.targets)?;
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE tasks SET
                name = ?2, message = ?3, attachments = ?4, targets = ?5,
                trigger = ?6, status = ?7, send_delay_secs = ?8, next_run = ?9,
                updated_at = ?10
             WHERE id = ?1",
            params![
                task.id,
                task.name,
                task.message,
                attachments_json,
                targets_json,
                trigger_json,
                task.status.to_string(),
                task.send_delay_secs,
                task.next_run,
                now,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::TaskNotFound {
                id: task.id.clone(),
            });
        }
        Ok(())
    }

    pub fn delete_task(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let changed = db.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::TaskNotFound { id: id.to_string() });
        }
        Ok(())
    }

    /// An identity's tasks, newest first. Archived rows are excluded — they
    /// have their own listing.
    pub fn list_tasks(&self, identity_id: IdentityId) -> Result<Vec<Task>> {
        self.query_tasks(
            "SELECT {cols} FROM tasks
             WHERE identity_id = ?1 AND status != 'archived'
             ORDER BY created_at DESC",
            identity_id,
        )
    }

    pub fn list_archived_tasks(&self, identity_id: IdentityId) -> Result<Vec<Task>> {
        self.query_tasks(
            "SELECT {cols} FROM tasks
             WHERE identity_id = ?1 AND status = 'archived'
             ORDER BY updated_at DESC",
            identity_id,
        )
    }

    /// Tasks the scheduler currently owns an entry for (active or scheduled).
    pub fn list_runnable_tasks(&self, identity_id: IdentityId) -> Result<Vec<Task>> {
        self.query_tasks(
            "SELECT {cols} FROM tasks
             WHERE identity_id = ?1 AND status IN ('active', 'scheduled')
             ORDER BY created_at",
            identity_id,
        )
    }

    /// Every task for an identity, archived included — the reconciler scans
    /// all of them when migrating a destination id.
    pub fn list_all_tasks(&self, identity_id: IdentityId) -> Result<Vec<Task>> {
        self.query_tasks(
            "SELECT {cols} FROM tasks WHERE identity_id = ?1 ORDER BY created_at",
            identity_id,
        )
    }

    // ── run lifecycle ────────────────────────────────────────────────────────

    /// The single-flight latch: one conditional UPDATE that succeeds only if
    /// the task is not already running and is in a runnable state. SQLite
    /// applies the row update atomically, so of N concurrent callers exactly
    /// one observes `changed == 1`.
    pub fn try_begin_run(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE tasks SET running = 1
             WHERE id = ?1 AND running = 0 AND status IN ('active', 'scheduled')",
            params![id],
        )?;
        if changed == 0 {
            debug!(task_id = %id, "run attempt skipped (already running or not runnable)");
        }
        Ok(changed == 1)
    }

    /// Release the latch and record the outcome of one execution. Runs on
    /// every exit path of the execution routine — a task whose `running`
    /// stays set is deadlocked forever.
    pub fn finish_run(&self, id: &str, outcome: &RunOutcome) -> Result<()> {
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        match outcome.new_status {
            Some(status) => db.execute(
                "UPDATE tasks SET
                    running = 0,
                    execution_count = execution_count + 1,
                    success_count = success_count + ?2,
                    failure_count = failure_count + ?3,
                    last_run = ?4, next_run = ?5, status = ?6, updated_at = ?4
                 WHERE id = ?1",
                params![
                    id,
                    outcome.sent,
                    outcome.failed,
                    now,
                    outcome.next_run,
                    status.to_string()
                ],
            )?,
            None => db.execute(
                "UPDATE tasks SET
                    running = 0,
                    execution_count = execution_count + 1,
                    success_count = success_count + ?2,
                    failure_count = failure_count + ?3,
                    last_run = ?4, next_run = ?5, updated_at = ?4
                 WHERE id = ?1",
                params![id, outcome.sent, outcome.failed, now, outcome.next_run],
            )?,
        };
        Ok(())
    }

    /// Unconditionally clear the latch without touching counters. Used when a
    /// run aborts before anything was attempted.
    pub fn clear_running(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("UPDATE tasks SET running = 0 WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Transition to `paused`: no live scheduler entry, no next run, latch
    /// cleared.
    pub fn set_task_paused(&self, id: &str) -> Result<()> {
        self.set_status_and_next_run(id, TaskStatus::Paused, None)
    }

    /// Transition back to a runnable state with a freshly computed next fire.
    pub fn set_task_resumed(
        &self,
        id: &str,
        status: TaskStatus,
        next_run: &str,
    ) -> Result<()> {
        self.set_status_and_next_run(id, status, Some(next_run))
    }

    /// Transition to `archived`: retained for history, never fired again
    /// unless unarchived.
    pub fn set_task_archived(&self, id: &str) -> Result<()> {
        self.set_status_and_next_run(id, TaskStatus::Archived, None)
    }

    /// Rewrite just the target list (the reconciler's migration path).
    pub fn update_task_targets(&self, id: &str, targets: &[DestinationId]) -> Result<()> {
        let targets_json = to_json(&targets)?;
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE tasks SET targets = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, targets_json, now],
        )?;
        if changed == 0 {
            return Err(StoreError::TaskNotFound { id: id.to_string() });
        }
        Ok(())
    }

    // ── execution history & stats ────────────────────────────────────────────

    /// Append one row to the execution history.
    pub fn record_execution(
        &self,
        task_id: &str,
        outcome: &str,
        total: u64,
        sent: u64,
        failed: u64,
        error: Option<&str>,
    ) -> Result<()> {
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO task_executions (task_id, executed_at, outcome, total, sent, failed, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![task_id, now, outcome, total, sent, failed, error],
        )?;
        Ok(())
    }

    /// Execution history for one task, newest first.
    pub fn list_executions(&self, task_id: &str, limit: usize) -> Result<Vec<ExecutionRecord>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, task_id, executed_at, outcome, total, sent, failed, error
             FROM task_executions WHERE task_id = ?1
             ORDER BY executed_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![task_id, limit as i64], row_to_execution)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Aggregate task counters for one identity's dashboard.
    pub fn identity_stats(&self, identity_id: IdentityId) -> Result<IdentityStats> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT
                COUNT(*) FILTER (WHERE status != 'archived'),
                COUNT(*) FILTER (WHERE status = 'active'),
                COUNT(*) FILTER (WHERE status = 'archived'),
                COALESCE(SUM(execution_count), 0)
             FROM tasks WHERE identity_id = ?1",
            params![identity_id],
            |row| {
                Ok(IdentityStats {
                    total_tasks: row.get(0)?,
                    active_tasks: row.get(1)?,
                    archived_tasks: row.get(2)?,
                    total_executions: row.get(3)?,
                })
            },
        )
        .map_err(StoreError::Database)
    }

    // ── private helpers ──────────────────────────────────────────────────────

    fn query_tasks(&self, sql_template: &str, identity_id: IdentityId) -> Result<Vec<Task>> {
        let sql = sql_template.replace("{cols}", TASK_COLUMNS);
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt
            .query_map(params![identity_id], row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn set_status_and_next_run(
        &self,
        id: &str,
        status: TaskStatus,
        next_run: Option<&str>,
    ) -> Result<()> {
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE tasks SET status = ?2, next_run = ?3, running = 0, updated_at = ?4
             WHERE id = ?1",
            params![id, status.to_string(), next_run, now],
        )?;
        if changed == 0 {
            return Err(StoreError::TaskNotFound { id: id.to_string() });
        }
        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| StoreError::CorruptColumn(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use courier_core::trigger::Trigger;
    use courier_core::types::{new_task_id, now_rfc3339};

    use crate::types::{RunOutcome, Task, TaskStatus};
    use crate::Store;

    fn sample_task(identity_id: i64) -> Task {
        let now = now_rfc3339();
        Task {
            id: new_task_id(),
            identity_id,
            name: Some("morning digest".into()),
            message: "hello".into(),
            attachments: vec![],
            targets: vec![100, 200],
            trigger: Trigger::Interval { every_secs: 3600 },
            status: TaskStatus::Active,
            running: false,
            execution_count: 0,
            success_count: 0,
            failure_count: 0,
            send_delay_secs: 2,
            last_run: None,
            next_run: Some(now.clone()),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    fn store_with_identity() -> (Store, i64) {
        let store = Store::open_in_memory().unwrap();
        let identity = store.create_identity(1, None, None, None).unwrap();
        (store, identity.id)
    }

    #[test]
    fn insert_and_round_trip() {
        let (store, identity_id) = store_with_identity();
        let task = sample_task(identity_id);
        store.insert_task(&task).unwrap();

        let loaded = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(loaded.targets, vec![100, 200]);
        assert_eq!(loaded.trigger, Trigger::Interval { every_secs: 3600 });
        assert_eq!(loaded.status, TaskStatus::Active);
    }

    #[test]
    fn ownership_check_hides_foreign_tasks() {
        let (store, identity_id) = store_with_identity();
        let other = store.create_identity(2, None, None, None).unwrap();
        let task = sample_task(identity_id);
        store.insert_task(&task).unwrap();

        assert!(store.get_task_owned(&task.id, identity_id).unwrap().is_some());
        assert!(store.get_task_owned(&task.id, other.id).unwrap().is_none());
    }

    #[test]
    fn concurrent_begin_run_admits_exactly_one() {
        let (store, identity_id) = store_with_identity();
        let task = sample_task(identity_id);
        store.insert_task(&task).unwrap();

        let store = Arc::new(store);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let id = task.id.clone();
            handles.push(std::thread::spawn(move || {
                store.try_begin_run(&id).unwrap()
            }));
        }
        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
    }

    #[test]
    fn begin_run_refuses_paused_tasks() {
        let (store, identity_id) = store_with_identity();
        let mut task = sample_task(identity_id);
        task.status = TaskStatus::Paused;
        task.next_run = None;
        store.insert_task(&task).unwrap();

        assert!(!store.try_begin_run(&task.id).unwrap());
    }

    #[test]
    fn finish_run_clears_latch_and_counts() {
        let (store, identity_id) = store_with_identity();
        let task = sample_task(identity_id);
        store.insert_task(&task).unwrap();

        assert!(store.try_begin_run(&task.id).unwrap());
        store
            .finish_run(
                &task.id,
                &RunOutcome {
                    sent: 2,
                    failed: 1,
                    next_run: Some("2026-01-01T00:00:00+00:00".into()),
                    new_status: None,
                },
            )
            .unwrap();

        let loaded = store.get_task(&task.id).unwrap().unwrap();
        assert!(!loaded.running);
        assert_eq!(loaded.execution_count, 1);
        assert_eq!(loaded.success_count, 2);
        assert_eq!(loaded.failure_count, 1);
        assert!(loaded.last_run.is_some());
        // Latch is free again.
        assert!(store.try_begin_run(&task.id).unwrap());
    }

    #[test]
    fn invalidate_pauses_runnable_tasks() {
        let (store, identity_id) = store_with_identity();
        store.set_credential(identity_id, "blob").unwrap();
        let a = sample_task(identity_id);
        let mut b = sample_task(identity_id);
        b.status = TaskStatus::Archived;
        b.next_run = None;
        store.insert_task(&a).unwrap();
        store.insert_task(&b).unwrap();

        let paused = store.invalidate_identity(identity_id).unwrap();
        assert_eq!(paused, vec![a.id.clone()]);

        let a2 = store.get_task(&a.id).unwrap().unwrap();
        assert_eq!(a2.status, TaskStatus::Paused);
        assert!(a2.next_run.is_none());
        // Archived task untouched.
        let b2 = store.get_task(&b.id).unwrap().unwrap();
        assert_eq!(b2.status, TaskStatus::Archived);
    }

    #[test]
    fn stats_aggregate_counts() {
        let (store, identity_id) = store_with_identity();
        let a = sample_task(identity_id);
        let mut b = sample_task(identity_id);
        b.status = TaskStatus::Archived;
        store.insert_task(&a).unwrap();
        store.insert_task(&b).unwrap();

        let stats = store.identity_stats(identity_id).unwrap();
        assert_eq!(stats.total_tasks, 1);
        assert_eq!(stats.active_tasks, 1);
        assert_eq!(stats.archived_tasks, 1);
    }
}
