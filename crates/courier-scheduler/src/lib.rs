//! `courier-scheduler` — durable trigger registry with a tokio polling engine.
//!
//! # Overview
//!
//! Triggers are persisted to a SQLite `triggers` table keyed by task id, so a
//! process restart reconstructs identical future firing behavior. The
//! [`engine::SchedulerEngine`] polls the table every second and forwards due
//! task ids over an mpsc channel to whoever executes them; the engine itself
//! never runs task code.
//!
//! # Trigger variants
//!
//! | Variant    | Behaviour                                                  |
//! |------------|------------------------------------------------------------|
//! | `Interval` | Repeats; next fire = scheduled fire + period (drift-free)  |
//! | `OneTime`  | Single fire at an absolute UTC instant, then self-removes  |
//!
//! A trigger found overdue (e.g. after process downtime) fires exactly once
//! immediately, then fast-forwards to the next on-grid time — missed
//! intervals are never replayed individually.

pub mod db;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod types;

pub use engine::{SchedulerEngine, SchedulerHandle};
pub use error::{Result, SchedulerError};
pub use types::{FiredJob, TriggerEntry};
