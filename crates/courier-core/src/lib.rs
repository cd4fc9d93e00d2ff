//! `courier-core` — shared configuration, error type, and id helpers.
//!
//! Every other crate in the workspace depends on this one; it must stay free
//! of heavyweight dependencies (no tokio, no rusqlite).

pub mod config;
pub mod error;
pub mod trigger;
pub mod types;

pub use config::CourierConfig;
pub use error::{CoreError, Result};
pub use trigger::{interval_seconds, IntervalUnit, Trigger};
