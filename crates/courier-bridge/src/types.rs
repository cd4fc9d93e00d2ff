use std::time::Duration;

use courier_core::types::DestinationId;
use courier_channels::Destination;

/// A unit of network work submitted to an identity's worker.
///
/// Each request carries the decrypted credential: workers build a fresh
/// client session per request and tear it down afterwards, so no plaintext
/// credential outlives the operation it was decrypted for.
#[derive(Debug)]
pub enum BridgeRequest {
    /// Deliver one task payload to every target, in order, with a fixed
    /// delay between attempts.
    SendBatch {
        credential: String,
        targets: Vec<DestinationId>,
        message: String,
        /// Attachment paths, order preserved; empty means text-only.
        attachments: Vec<String>,
        delay: Duration,
    },

    /// Fetch the identity's current destination list.
    ListDestinations { credential: String },

    /// Probe whether the platform still accepts the credential.
    CheckAuthorized { credential: String },
}

/// Reply to a [`BridgeRequest`], matched by variant.
#[derive(Debug)]
pub enum BridgeResponse {
    Batch(BatchReport),
    Destinations(Vec<Destination>),
    Authorized(bool),
}

/// Outcome of one send batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub sent: u64,
    pub failed: u64,
    /// True when an auth-revoked error aborted the batch. The destinations
    /// that were never attempted are already counted in `failed`.
    pub auth_revoked: bool,
}
