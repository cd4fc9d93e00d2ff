use serde::{Deserialize, Serialize};

use courier_core::trigger::Trigger;

/// Emitted by the engine when a trigger comes due. Carries only the task id;
/// the executor reloads the task row itself so it always acts on fresh state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiredJob {
    pub task_id: String,
}

/// A persisted registry entry, as returned by
/// [`SchedulerHandle::get`](crate::engine::SchedulerHandle::get).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEntry {
    pub task_id: String,
    pub trigger: Trigger,
    pub paused: bool,
    /// ISO-8601 instant of the next planned fire; `None` while paused.
    pub next_fire: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
