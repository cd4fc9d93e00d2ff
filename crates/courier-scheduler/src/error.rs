use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The stored trigger JSON failed to parse.
    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    /// No trigger entry exists for the given task id.
    #[error("Trigger entry not found: {id}")]
    EntryNotFound { id: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
