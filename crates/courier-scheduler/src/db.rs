use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `triggers` table (idempotent) and an index on `next_fire` so
/// the 1 s polling query stays cheap with thousands of registered tasks.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS triggers (
            task_id     TEXT    NOT NULL PRIMARY KEY,
            trigger     TEXT    NOT NULL,   -- tagged JSON Trigger
            paused      INTEGER NOT NULL DEFAULT 0,
            next_fire   TEXT,               -- ISO-8601; NULL while paused
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_triggers_next_fire ON triggers (next_fire);
        ",
    )?;
    Ok(())
}
