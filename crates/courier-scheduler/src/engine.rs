use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use courier_core::trigger::Trigger;

use crate::{
    db::init_db,
    error::{Result, SchedulerError},
    schedule::{advance_after_fire, initial_fire},
    types::{FiredJob, TriggerEntry},
};

/// Shared handle for trigger management while the engine loop runs.
///
/// Uses its own `Connection` so the service layer can add/remove triggers
/// without conflicting with the engine's polling queries. Cloneable; all
/// clones share one connection.
#[derive(Clone)]
pub struct SchedulerHandle {
    conn: Arc<Mutex<Connection>>,
}

impl SchedulerHandle {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Register (or replace) the trigger for `task_id`.
    ///
    /// Replace-semantics by contract: scheduling an id that already has an
    /// entry silently supersedes it — including any paused state — and is
    /// never an error. Returns the computed first fire time.
    pub fn add(&self, task_id: &str, trigger: &Trigger) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let next = initial_fire(trigger, now);
        let trigger_json = serde_json::to_string(trigger)
            .map_err(|e| SchedulerError::InvalidTrigger(e.to_string()))?;
        let now_str = now.to_rfc3339();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO triggers (task_id, trigger, paused, next_fire, created_at, updated_at)
             VALUES (?1, ?2, 0, ?3, ?4, ?4)
             ON CONFLICT (task_id) DO UPDATE SET
                trigger = excluded.trigger,
                paused = 0,
                next_fire = excluded.next_fire,
                updated_at = excluded.updated_at",
            rusqlite::params![task_id, trigger_json, next.to_rfc3339(), now_str],
        )?;
        info!(task_id = %task_id, next_fire = %next, "trigger registered");
        Ok(next)
    }

    /// Atomically swap in a new trigger spec. Same replace-semantics as
    /// [`add`](Self::add); kept separate so call sites read as intent.
    pub fn reschedule(&self, task_id: &str, trigger: &Trigger) -> Result<DateTime<Utc>> {
        let next = self.add(task_id, trigger)?;
        debug!(task_id = %task_id, "trigger rescheduled");
        Ok(next)
    }

    /// Drop the entry for `task_id`. Removing an id with no entry is a no-op
    /// — the cascade and delete paths must be idempotent.
    pub fn remove(&self, task_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM triggers WHERE task_id = ?1", [task_id])?;
        if n > 0 {
            info!(task_id = %task_id, "trigger removed");
        }
        Ok(())
    }

    /// Suspend firing without discarding the trigger spec. The entry stops
    /// being live (`next_fire = NULL`) until resumed or replaced.
    pub fn pause(&self, task_id: &str) -> Result<()> {
        let now_str = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE triggers SET paused = 1, next_fire = NULL, updated_at = ?2
             WHERE task_id = ?1",
            rusqlite::params![task_id, now_str],
        )?;
        if n == 0 {
            return Err(SchedulerError::EntryNotFound {
                id: task_id.to_string(),
            });
        }
        info!(task_id = %task_id, "trigger paused");
        Ok(())
    }

    /// Reinstate a paused entry. The next fire is recomputed from the current
    /// time — never from the stale pre-pause value.
    pub fn resume(&self, task_id: &str) -> Result<DateTime<Utc>> {
        let entry = self
            .get(task_id)?
            .ok_or_else(|| SchedulerError::EntryNotFound {
                id: task_id.to_string(),
            })?;
        let now = Utc::now();
        let next = initial_fire(&entry.trigger, now);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE triggers SET paused = 0, next_fire = ?2, updated_at = ?3
             WHERE task_id = ?1",
            rusqlite::params![task_id, next.to_rfc3339(), now.to_rfc3339()],
        )?;
        info!(task_id = %task_id, next_fire = %next, "trigger resumed");
        Ok(next)
    }

    /// Fetch one entry, or `None` when the id has no trigger registered.
    pub fn get(&self, task_id: &str) -> Result<Option<TriggerEntry>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            "SELECT task_id, trigger, paused, next_fire, created_at, updated_at
             FROM triggers WHERE task_id = ?1",
            [task_id],
            row_to_entry,
        ) {
            Ok(e) => Ok(Some(e)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(SchedulerError::Database(e)),
        }
    }

    /// The next planned fire for `task_id`, if the entry is live.
    pub fn next_fire(&self, task_id: &str) -> Result<Option<String>> {
        Ok(self.get(task_id)?.and_then(|e| e.next_fire))
    }

    /// Number of registered entries (live and paused). Used by tests and the
    /// daemon's startup log line.
    pub fn entry_count(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let n = conn.query_row("SELECT COUNT(*) FROM triggers", [], |row| {
            row.get::<_, u64>(0)
        })?;
        Ok(n)
    }
}

/// Core engine: polls the trigger registry and forwards due task ids.
pub struct SchedulerEngine {
    conn: Connection,
    fired_tx: mpsc::Sender<FiredJob>,
}

impl SchedulerEngine {
    /// Create a new engine, initialising the schema if needed.
    ///
    /// Every due trigger is forwarded as a [`FiredJob`] via `fired_tx`. The
    /// sender is non-blocking (`try_send`) so the tick loop is never stalled
    /// by a slow executor.
    pub fn new(conn: Connection, fired_tx: mpsc::Sender<FiredJob>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { conn, fired_tx })
    }

    /// Main event loop. Polls every second until `shutdown` broadcasts `true`.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler engine started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()) {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Process all triggers whose `next_fire` has arrived.
    ///
    /// The registry row is advanced (or deleted, for exhausted one-time
    /// triggers) *before* the fire is forwarded: a crash between the two
    /// loses at most one forwarded fire, never double-schedules it, and the
    /// execution guard makes the executor side idempotent anyway.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        let now_str = now.to_rfc3339();

        // Collect eagerly so `stmt` is dropped before the row updates below.
        let due: Vec<(String, String, String)> = {
            let mut stmt = self.conn.prepare_cached(
                "SELECT task_id, trigger, next_fire FROM triggers
                 WHERE paused = 0 AND next_fire IS NOT NULL AND next_fire <= ?1",
            )?;
            let rows = stmt.query_map([&now_str], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            rows.filter_map(|r| r.ok()).collect()
        };

        for (task_id, trigger_json, next_fire_str) in due {
            let trigger: Trigger = match serde_json::from_str(&trigger_json) {
                Ok(t) => t,
                Err(e) => {
                    error!(task_id = %task_id, "bad trigger JSON, dropping entry: {e}");
                    self.conn
                        .execute("DELETE FROM triggers WHERE task_id = ?1", [&task_id])?;
                    continue;
                }
            };
            let scheduled_fire = DateTime::parse_from_rfc3339(&next_fire_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now);

            match advance_after_fire(&trigger, scheduled_fire, now) {
                Some(next) => {
                    self.conn.execute(
                        "UPDATE triggers SET next_fire = ?2, updated_at = ?3 WHERE task_id = ?1",
                        rusqlite::params![task_id, next.to_rfc3339(), now_str],
                    )?;
                    debug!(task_id = %task_id, next_fire = %next, "trigger fired");
                }
                None => {
                    // One-time trigger: exhausted, self-removes.
                    self.conn
                        .execute("DELETE FROM triggers WHERE task_id = ?1", [&task_id])?;
                    debug!(task_id = %task_id, "one-time trigger fired and removed");
                }
            }

            if self
                .fired_tx
                .try_send(FiredJob {
                    task_id: task_id.clone(),
                })
                .is_err()
            {
                warn!(task_id = %task_id, "fired-job channel full or closed — fire dropped");
            }
        }
        Ok(())
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<TriggerEntry> {
    let trigger_json: String = row.get(1)?;
    let trigger: Trigger = serde_json::from_str(&trigger_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(TriggerEntry {
        task_id: row.get(0)?,
        trigger,
        paused: row.get::<_, i64>(2)? != 0,
        next_fire: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
