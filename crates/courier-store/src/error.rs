use thiserror::Error;

/// Errors that can occur within the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored JSON column (targets, attachments, trigger) failed to parse.
    #[error("Corrupt column data: {0}")]
    CorruptColumn(String),

    /// No identity with the given id exists.
    #[error("Identity not found: {id}")]
    IdentityNotFound { id: i64 },

    /// No task with the given id exists (or it belongs to another identity).
    #[error("Task not found: {id}")]
    TaskNotFound { id: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
