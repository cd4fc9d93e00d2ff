//! `courier-bridge` — the serialization point for all remote network calls.
//!
//! # Overview
//!
//! The remote platform's client session is not safe to drive from several
//! concurrent callers, so every network operation for an identity funnels
//! through that identity's single bridge worker: a supervised tokio task
//! owning a bounded request queue. Two operations for the same identity never
//! interleave; operations for different identities proceed independently.
//!
//! Callers submit a [`BridgeRequest`] and await the reply (with an explicit
//! per-request timeout). Workers are spawned lazily on first use and respawned
//! transparently if they die.

pub mod error;
pub mod types;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use courier_core::config::BridgeConfig;
use courier_core::types::IdentityId;
use courier_channels::MessengerFactory;

use worker::{run_worker, Job};

pub use error::{BridgeError, Result};
pub use types::{BatchReport, BridgeRequest, BridgeResponse};

/// Handle to the worker pool. Cheap to clone; all clones share the registry.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    workers: DashMap<IdentityId, mpsc::Sender<Job>>,
    factory: Arc<dyn MessengerFactory>,
    queue_capacity: usize,
    request_timeout: Duration,
}

impl Bridge {
    pub fn new(factory: Arc<dyn MessengerFactory>, config: &BridgeConfig) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                workers: DashMap::new(),
                factory,
                queue_capacity: config.queue_capacity,
                request_timeout: Duration::from_secs(config.request_timeout_secs),
            }),
        }
    }

    /// Submit one request for `identity_id` and await its result.
    ///
    /// Enqueues behind any in-flight operation for the same identity. Returns
    /// [`BridgeError::Timeout`] when the reply does not arrive within the
    /// configured budget — the dropped reply handle doubles as the
    /// cancellation signal: a worker that has not started the request yet
    /// skips it.
    pub async fn submit(
        &self,
        identity_id: IdentityId,
        request: BridgeRequest,
    ) -> Result<BridgeResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let mut job = Job {
            request,
            reply: reply_tx,
        };

        // First attempt, then one retry against a fresh worker if the old
        // one's queue is gone (worker died or was never started).
        for attempt in 0..2 {
            let tx = self.worker_sender(identity_id);
            match tx.send(job).await {
                Ok(()) => {
                    return match tokio::time::timeout(self.inner.request_timeout, reply_rx).await {
                        Ok(Ok(result)) => result,
                        Ok(Err(_)) => Err(BridgeError::WorkerGone),
                        Err(_) => Err(BridgeError::Timeout {
                            ms: self.inner.request_timeout.as_millis() as u64,
                        }),
                    };
                }
                Err(mpsc::error::SendError(returned)) => {
                    debug!(identity_id, attempt, "bridge worker gone, respawning");
                    self.inner.workers.remove(&identity_id);
                    job = returned;
                }
            }
        }
        warn!(identity_id, "bridge worker unavailable after respawn");
        Err(BridgeError::WorkerGone)
    }

    /// Drop the worker for an identity, if any. Called by the invalidation
    /// cascade — queued requests error out with `WorkerGone`, in-flight ones
    /// finish their current operation first.
    pub fn retire_worker(&self, identity_id: IdentityId) {
        if self.inner.workers.remove(&identity_id).is_some() {
            debug!(identity_id, "bridge worker retired");
        }
    }

    fn worker_sender(&self, identity_id: IdentityId) -> mpsc::Sender<Job> {
        self.inner
            .workers
            .entry(identity_id)
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(self.inner.queue_capacity);
                let factory = Arc::clone(&self.inner.factory);
                tokio::spawn(run_worker(identity_id, factory, rx));
                tx
            })
            .clone()
    }
}
