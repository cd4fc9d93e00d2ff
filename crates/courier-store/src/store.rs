use std::sync::Mutex;

use rusqlite::Connection;

use crate::db::init_db;
use crate::error::Result;

/// Thread-safe handle to the courier database.
///
/// Wraps a single SQLite connection in a `Mutex`. Each subsystem gets its own
/// `Store` (own connection); WAL mode keeps cross-connection contention low.
/// For a multi-node deployment this would become a connection pool, but a
/// Mutex is sufficient for the single-process target.
pub struct Store {
    pub(crate) db: Mutex<Connection>,
}

impl Store {
    /// Wrap an already-open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open (or create) the database at `path` with the pragmas the store
    /// relies on: WAL journaling and per-connection foreign-key enforcement.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::new(conn)
    }

    /// In-memory store for tests.
    #[doc(hidden)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::new(conn)
    }
}
