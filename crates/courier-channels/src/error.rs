use thiserror::Error;

/// Errors surfaced by a remote-platform adapter.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The underlying transport could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The stored long-lived credential is no longer valid. This is the one
    /// variant with systemic consequences: it triggers the invalidation
    /// cascade and aborts the remainder of an in-progress send run.
    #[error("Credential revoked: {0}")]
    AuthRevoked(String),

    /// A single send to one destination failed for a non-auth reason.
    /// Counted against that destination only; the run continues.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The remote platform returned an error unrelated to a specific send.
    #[error("Remote error: {0}")]
    Remote(String),

    /// An operation exceeded its allowed time budget.
    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The stored credential blob could not be decoded.
    #[error("Credential codec error: {0}")]
    Codec(String),
}

impl ChannelError {
    /// True when this failure means the credential itself is dead, as opposed
    /// to a transient delivery problem.
    pub fn is_auth_revoked(&self) -> bool {
        matches!(self, ChannelError::AuthRevoked(_))
    }
}
