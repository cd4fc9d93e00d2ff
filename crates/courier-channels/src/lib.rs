//! `courier-channels` — capability traits the delivery core consumes.
//!
//! The remote messaging platform, the credential codec, and the notification
//! channel are all external collaborators. This crate defines the narrow
//! surfaces the core drives them through; concrete adapters live elsewhere
//! (e.g. `courier-telegram` for the notifier).

pub mod codec;
pub mod error;
pub mod messenger;
pub mod notify;
pub mod types;

pub use codec::{Base64Codec, CredentialCodec};
pub use error::ChannelError;
pub use messenger::{Messenger, MessengerFactory};
pub use notify::Notifier;
pub use types::{Destination, DestinationKind};
