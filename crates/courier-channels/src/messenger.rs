use async_trait::async_trait;

use courier_core::types::DestinationId;

use crate::{error::ChannelError, types::Destination};

/// A live client session against the remote messaging platform, acting as one
/// identity. Created per operation from a decrypted credential and discarded
/// after `disconnect`.
///
/// Implementations are driven by exactly one bridge worker at a time — they
/// do not need to be internally synchronized, but must be `Send` so the
/// worker task can own them.
#[async_trait]
pub trait Messenger: Send {
    /// Establish the connection. Must be called before any other operation.
    async fn connect(&mut self) -> Result<(), ChannelError>;

    /// Close the connection. Safe to call when already disconnected.
    async fn disconnect(&mut self) -> Result<(), ChannelError>;

    /// True when the platform still accepts this session's credential.
    async fn is_authorized(&mut self) -> Result<bool, ChannelError>;

    /// Deliver a plain text message to one destination.
    async fn send_text(&mut self, dest: DestinationId, text: &str) -> Result<(), ChannelError>;

    /// Deliver a set of files to one destination, in the given order, with
    /// `caption` attached. The platform presents them as one album.
    async fn send_files(
        &mut self,
        dest: DestinationId,
        paths: &[String],
        caption: &str,
    ) -> Result<(), ChannelError>;

    /// Fetch the identity's current destination list. Includes non-group
    /// destinations; filtering is the caller's concern.
    async fn list_destinations(&mut self) -> Result<Vec<Destination>, ChannelError>;
}

/// Constructs a [`Messenger`] from a decrypted credential string.
///
/// The factory is the seam between the core and the platform adapter: the
/// bridge holds one factory for the whole process and builds a fresh session
/// per request, mirroring how short-lived client objects are cheapest to
/// reason about on this platform.
pub trait MessengerFactory: Send + Sync {
    fn create(&self, credential: &str) -> Result<Box<dyn Messenger>, ChannelError>;
}
