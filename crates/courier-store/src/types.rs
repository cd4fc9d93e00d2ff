use serde::{Deserialize, Serialize};

use courier_core::trigger::Trigger;
use courier_core::types::{DestinationId, IdentityId};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// One-time task waiting for its instant.
    Scheduled,
    /// Repeating task with a live scheduler entry.
    Active,
    /// Suspended — explicitly, or by the invalidation cascade.
    Paused,
    /// Removed from scheduling but retained for history.
    Archived,
    /// One-time task that delivered to at least one destination.
    Sent,
    /// One-time task that delivered to none.
    Failed,
}

impl TaskStatus {
    /// States in which the scheduler may fire this task.
    pub fn is_runnable(&self) -> bool {
        matches!(self, TaskStatus::Active | TaskStatus::Scheduled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Active => "active",
            TaskStatus::Paused => "paused",
            TaskStatus::Archived => "archived",
            TaskStatus::Sent => "sent",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(TaskStatus::Scheduled),
            "active" => Ok(TaskStatus::Active),
            "paused" => Ok(TaskStatus::Paused),
            "archived" => Ok(TaskStatus::Archived),
            "sent" => Ok(TaskStatus::Sent),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// An external account that owns tasks and chat bindings.
///
/// The credential blob is opaque here — encrypted by the codec collaborator,
/// decrypted only at the moment a bridge worker needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    /// Platform-native numeric id (unique).
    pub remote_id: i64,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub username: Option<String>,
    /// Encrypted credential blob; `None` after logout or invalidation.
    pub credential: Option<String>,
    pub authorized: bool,
    pub notifications_enabled: bool,
    pub simplified_login_enabled: bool,
    pub is_admin: bool,
    pub language: String,
    pub last_login: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A durable scheduled send job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Owner-facing opaque token, 32 hex chars.
    pub id: String,
    pub identity_id: IdentityId,
    pub name: Option<String>,
    pub message: String,
    /// Attachment file paths. Order is meaningful: they are sent together as
    /// one album, in this order.
    pub attachments: Vec<String>,
    /// Destination ids. Deduplicated; order carries no meaning but is kept
    /// stable so executions attempt destinations deterministically.
    pub targets: Vec<DestinationId>,
    pub trigger: Trigger,
    pub status: TaskStatus,
    /// Single-flight latch. Only ever mutated through
    /// [`Store::try_begin_run`](crate::Store::try_begin_run) and the
    /// finish/pause paths.
    pub running: bool,
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Seconds to wait between destinations within one run.
    pub send_delay_secs: u64,
    pub last_run: Option<String>,
    pub next_run: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Result of one finished execution, applied by
/// [`Store::finish_run`](crate::Store::finish_run).
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub sent: u64,
    pub failed: u64,
    /// Next scheduled fire, as reported by the scheduler after this run.
    pub next_run: Option<String>,
    /// Terminal transition for one-time tasks (`Sent` / `Failed`);
    /// `None` leaves the status untouched.
    pub new_status: Option<TaskStatus>,
}

/// A cached record of a destination the identity may post to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatBinding {
    pub id: i64,
    pub identity_id: IdentityId,
    pub destination_id: DestinationId,
    pub name: String,
    /// "group" or "supergroup" (stored as text).
    pub kind: String,
    pub active: bool,
    pub last_checked: String,
    pub created_at: String,
    pub updated_at: String,
}

/// One row of the append-only execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub task_id: String,
    pub executed_at: String,
    /// "success", "partial", or "failed".
    pub outcome: String,
    pub total: u64,
    pub sent: u64,
    pub failed: u64,
    pub error: Option<String>,
}

/// Aggregate counters for one identity's task list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityStats {
    pub total_tasks: u64,
    pub active_tasks: u64,
    pub archived_tasks: u64,
    pub total_executions: u64,
}
