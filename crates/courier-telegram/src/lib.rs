//! `courier-telegram` — Telegram bot adapter for the notification channel.
//!
//! The scheduled sends themselves go through the owner's own platform
//! session (behind the `Messenger` capability); this crate only covers the
//! little bot that tells owners how their runs went.

pub mod notifier;

pub use notifier::TelegramNotifier;
