//! `courier-store` — durable records for identities, tasks, and chat
//! bindings, backed by SQLite.
//!
//! # Overview
//!
//! All rows live in one database file shared by every subsystem; each
//! subsystem opens its own connection (WAL mode makes concurrent readers
//! cheap). The [`Store`] handle wraps a single connection in a `Mutex` and is
//! cloned via `Arc` wherever the delivery core needs it.
//!
//! The one piece of cross-process coordination lives here too: the task
//! `running` latch is flipped with a conditional UPDATE
//! ([`Store::try_begin_run`]) so that overlapping executions of the same task
//! are impossible even when several workers poll the same database.

pub mod binding;
pub mod db;
pub mod error;
pub mod identity;
pub mod store;
pub mod task;
pub mod types;

pub use error::{Result, StoreError};
pub use store::Store;
pub use types::{
    ChatBinding, ExecutionRecord, Identity, IdentityStats, RunOutcome, Task, TaskStatus,
};
