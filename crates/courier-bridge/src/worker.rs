use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use courier_core::types::IdentityId;
use courier_channels::{Messenger, MessengerFactory};

use crate::error::Result;
use crate::types::{BatchReport, BridgeRequest, BridgeResponse};

/// One queued request plus its reply slot.
pub(crate) struct Job {
    pub request: BridgeRequest,
    pub reply: oneshot::Sender<Result<BridgeResponse>>,
}

/// Body of one identity's worker task: drains the queue one job at a time,
/// building a fresh client session per job. Exits when the queue closes.
pub(crate) async fn run_worker(
    identity_id: IdentityId,
    factory: Arc<dyn MessengerFactory>,
    mut rx: mpsc::Receiver<Job>,
) {
    debug!(identity_id, "bridge worker started");
    while let Some(job) = rx.recv().await {
        // The caller timed out and dropped the receiver — don't burn a
        // network session on a result nobody will read.
        if job.reply.is_closed() {
            debug!(identity_id, "skipping cancelled bridge request");
            continue;
        }
        let result = perform(identity_id, factory.as_ref(), job.request).await;
        // A send failure here means the caller gave up mid-operation; the
        // work itself is already done.
        let _ = job.reply.send(result);
    }
    debug!(identity_id, "bridge worker exiting (queue closed)");
}

async fn perform(
    identity_id: IdentityId,
    factory: &dyn MessengerFactory,
    request: BridgeRequest,
) -> Result<BridgeResponse> {
    match request {
        BridgeRequest::SendBatch {
            credential,
            targets,
            message,
            attachments,
            delay,
        } => {
            let mut client = factory.create(&credential)?;
            client.connect().await?;
            let report =
                send_batch(identity_id, client.as_mut(), &targets, &message, &attachments, delay)
                    .await;
            disconnect_quietly(identity_id, client.as_mut()).await;
            Ok(BridgeResponse::Batch(report))
        }

        BridgeRequest::ListDestinations { credential } => {
            let mut client = factory.create(&credential)?;
            client.connect().await?;
            let result = client.list_destinations().await;
            disconnect_quietly(identity_id, client.as_mut()).await;
            Ok(BridgeResponse::Destinations(result?))
        }

        BridgeRequest::CheckAuthorized { credential } => {
            let mut client = factory.create(&credential)?;
            client.connect().await?;
            let result = client.is_authorized().await;
            disconnect_quietly(identity_id, client.as_mut()).await;
            Ok(BridgeResponse::Authorized(result?))
        }
    }
}

/// Attempt every target in order. Auth revocation aborts the remainder (the
/// untouched targets count as failed); any other per-destination error counts
/// that destination failed and moves on.
async fn send_batch(
    identity_id: IdentityId,
    client: &mut dyn Messenger,
    targets: &[i64],
    message: &str,
    attachments: &[String],
    delay: std::time::Duration,
) -> BatchReport {
    let mut report = BatchReport::default();

    for (i, dest) in targets.iter().enumerate() {
        let outcome = if attachments.is_empty() {
            client.send_text(*dest, message).await
        } else {
            client.send_files(*dest, attachments, message).await
        };

        match outcome {
            Ok(()) => report.sent += 1,
            Err(e) if e.is_auth_revoked() => {
                warn!(identity_id, dest, "send aborted: credential revoked");
                // This destination plus everything not yet attempted.
                report.failed += (targets.len() - i) as u64;
                report.auth_revoked = true;
                return report;
            }
            Err(e) => {
                info!(identity_id, dest, error = %e, "send to destination failed");
                report.failed += 1;
            }
        }

        if i + 1 < targets.len() {
            tokio::time::sleep(delay).await;
        }
    }
    report
}

async fn disconnect_quietly(identity_id: IdentityId, client: &mut dyn Messenger) {
    if let Err(e) = client.disconnect().await {
        debug!(identity_id, error = %e, "disconnect after operation failed");
    }
}
