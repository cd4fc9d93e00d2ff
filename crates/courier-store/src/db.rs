use std::str::FromStr;

use rusqlite::Connection;

use courier_core::trigger::Trigger;

use crate::error::Result;
use crate::types::{ChatBinding, ExecutionRecord, Identity, Task, TaskStatus};

/// Initialise the courier schema in `conn`.
///
/// Idempotent — safe to run on every startup. Foreign keys must be enabled
/// per connection (`PRAGMA foreign_keys=ON`) for the identity cascade deletes
/// to take effect; [`Store::open`](crate::Store::open) does this.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS identities (
            id                       INTEGER PRIMARY KEY,
            remote_id                INTEGER NOT NULL UNIQUE,
            phone                    TEXT UNIQUE,
            first_name               TEXT,
            username                 TEXT,
            credential               TEXT,               -- encrypted blob or NULL
            authorized               INTEGER NOT NULL DEFAULT 0,
            notifications_enabled    INTEGER NOT NULL DEFAULT 1,
            simplified_login_enabled INTEGER NOT NULL DEFAULT 0,
            is_admin                 INTEGER NOT NULL DEFAULT 0,
            language                 TEXT    NOT NULL DEFAULT 'en',
            last_login               TEXT,
            created_at               TEXT    NOT NULL,
            updated_at               TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS tasks (
            id               TEXT    NOT NULL PRIMARY KEY,
            identity_id      INTEGER NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
            name             TEXT,
            message          TEXT    NOT NULL,
            attachments      TEXT    NOT NULL DEFAULT '[]',  -- JSON array, ordered
            targets          TEXT    NOT NULL DEFAULT '[]',  -- JSON array, deduplicated
            trigger          TEXT    NOT NULL,               -- tagged JSON Trigger
            status           TEXT    NOT NULL DEFAULT 'scheduled',
            running          INTEGER NOT NULL DEFAULT 0,
            execution_count  INTEGER NOT NULL DEFAULT 0,
            success_count    INTEGER NOT NULL DEFAULT 0,
            failure_count    INTEGER NOT NULL DEFAULT 0,
            send_delay_secs  INTEGER NOT NULL DEFAULT 2,
            last_run         TEXT,
            next_run         TEXT,
            created_at       TEXT    NOT NULL,
            updated_at       TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_tasks_identity ON tasks (identity_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_status   ON tasks (status);

        CREATE TABLE IF NOT EXISTS chat_bindings (
            id             INTEGER PRIMARY KEY,
            identity_id    INTEGER NOT NULL REFERENCES identities(id) ON DELETE CASCADE,
            destination_id INTEGER NOT NULL,
            name           TEXT    NOT NULL,
            kind           TEXT    NOT NULL,
            active         INTEGER NOT NULL DEFAULT 1,
            last_checked   TEXT    NOT NULL,
            created_at     TEXT    NOT NULL,
            updated_at     TEXT    NOT NULL,
            UNIQUE (identity_id, destination_id)
        ) STRICT;

        CREATE TABLE IF NOT EXISTS task_executions (
            id          INTEGER PRIMARY KEY,
            task_id     TEXT    NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            executed_at TEXT    NOT NULL,
            outcome     TEXT    NOT NULL,
            total       INTEGER NOT NULL,
            sent        INTEGER NOT NULL,
            failed      INTEGER NOT NULL,
            error       TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_executions_task ON task_executions (task_id);
        ",
    )?;
    Ok(())
}

/// Column order shared by every task SELECT in this crate.
pub(crate) const TASK_COLUMNS: &str =
    "id, identity_id, name, message, attachments, targets, trigger, status, running,
     execution_count, success_count, failure_count, send_delay_secs,
     last_run, next_run, created_at, updated_at";

/// Column order shared by every identity SELECT in this crate.
pub(crate) const IDENTITY_COLUMNS: &str =
    "id, remote_id, phone, first_name, username, credential, authorized,
     notifications_enabled, simplified_login_enabled, is_admin, language,
     last_login, created_at, updated_at";

pub(crate) fn row_to_identity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Identity> {
    Ok(Identity {
        id: row.get(0)?,
        remote_id: row.get(1)?,
        phone: row.get(2)?,
        first_name: row.get(3)?,
        username: row.get(4)?,
        credential: row.get(5)?,
        authorized: row.get::<_, i64>(6)? != 0,
        notifications_enabled: row.get::<_, i64>(7)? != 0,
        simplified_login_enabled: row.get::<_, i64>(8)? != 0,
        is_admin: row.get::<_, i64>(9)? != 0,
        language: row.get(10)?,
        last_login: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

pub(crate) fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let attachments: Vec<String> =
        serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or_default();
    let targets: Vec<i64> = serde_json::from_str(&row.get::<_, String>(5)?).unwrap_or_default();
    let trigger: Trigger = serde_json::from_str(&row.get::<_, String>(6)?).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status = TaskStatus::from_str(&row.get::<_, String>(7)?)
        .unwrap_or(TaskStatus::Paused);

    Ok(Task {
        id: row.get(0)?,
        identity_id: row.get(1)?,
        name: row.get(2)?,
        message: row.get(3)?,
        attachments,
        targets,
        trigger,
        status,
        running: row.get::<_, i64>(8)? != 0,
        execution_count: row.get::<_, u64>(9)?,
        success_count: row.get::<_, u64>(10)?,
        failure_count: row.get::<_, u64>(11)?,
        send_delay_secs: row.get::<_, u64>(12)?,
        last_run: row.get(13)?,
        next_run: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

pub(crate) fn row_to_binding(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatBinding> {
    Ok(ChatBinding {
        id: row.get(0)?,
        identity_id: row.get(1)?,
        destination_id: row.get(2)?,
        name: row.get(3)?,
        kind: row.get(4)?,
        active: row.get::<_, i64>(5)? != 0,
        last_checked: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub(crate) fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    Ok(ExecutionRecord {
        id: row.get(0)?,
        task_id: row.get(1)?,
        executed_at: row.get(2)?,
        outcome: row.get(3)?,
        total: row.get(4)?,
        sent: row.get(5)?,
        failed: row.get(6)?,
        error: row.get(7)?,
    })
}
