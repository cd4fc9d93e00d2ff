use thiserror::Error;

use courier_channels::ChannelError;

/// Errors surfaced to bridge callers.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The remote platform adapter failed at the session level (connect,
    /// listing, codec). Per-destination send failures are *not* reported
    /// here — they are folded into the [`BatchReport`](crate::BatchReport).
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The request did not complete within the configured budget.
    #[error("Bridge request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The worker died before replying (process shutdown, retired identity).
    #[error("Bridge worker is gone")]
    WorkerGone,
}

impl BridgeError {
    /// True when the underlying failure signals a revoked credential.
    pub fn is_auth_revoked(&self) -> bool {
        matches!(self, BridgeError::Channel(e) if e.is_auth_revoked())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
