use async_trait::async_trait;

use crate::error::ChannelError;

/// Best-effort delivery of a short status line to an identity's external
/// notification channel (distinct from the scheduled-send platform session).
///
/// Callers fire-and-forget: a failed notification is logged and never fed
/// back into task state.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// `remote_id` is the identity's platform-native numeric id.
    async fn send(&self, remote_id: i64, text: &str) -> Result<(), ChannelError>;
}
