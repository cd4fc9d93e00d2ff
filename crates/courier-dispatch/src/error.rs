use thiserror::Error;

/// Errors surfaced by the dispatch layer and the task service.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] courier_store::StoreError),

    #[error(transparent)]
    Scheduler(#[from] courier_scheduler::SchedulerError),

    #[error(transparent)]
    Bridge(#[from] courier_bridge::BridgeError),

    #[error(transparent)]
    Channel(#[from] courier_channels::ChannelError),

    #[error("Identity not found: {id}")]
    IdentityNotFound { id: i64 },

    #[error("Identity {id} is not authorized")]
    NotAuthorized { id: i64 },

    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
