//! `courier-dispatch` — the execution kernel tying the pieces together.
//!
//! # Overview
//!
//! The scheduler fires a due task → the execution guard takes the durable
//! single-flight lock → the bridge performs the sends with the identity's
//! decrypted credential → the outcome lands back on the task record and the
//! lock is released → a summary notification goes out if the owner wants one.
//! Auth failures detected anywhere divert into the invalidation cascade. The
//! reconciler runs independently per identity, rewriting task target lists
//! and chat bindings when the platform merges two destinations.
//!
//! Nothing in this crate is fatal to the host process: failures are contained
//! at each loop's boundary and surface only as task counters, an identity
//! turning unauthorized, or a missed best-effort notification.

pub mod cascade;
pub mod error;
pub mod executor;
pub mod guard;
pub mod notify;
pub mod reconciler;
pub mod service;

use std::sync::Arc;

use courier_bridge::Bridge;
use courier_channels::{CredentialCodec, Notifier};
use courier_scheduler::SchedulerHandle;
use courier_store::Store;

pub use error::{DispatchError, Result};
pub use executor::Executor;
pub use guard::ExecutionGuard;
pub use service::{ScheduleRequest, TaskRequest, TaskService};

/// The shared handles every dispatch component works against. Cheap to clone.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<Store>,
    pub scheduler: SchedulerHandle,
    pub bridge: Bridge,
    pub codec: Arc<dyn CredentialCodec>,
    /// `None` disables post-execution notifications process-wide.
    pub notifier: Option<Arc<dyn Notifier>>,
}
