// # Negotiator Trait
//
// Seam to the wire-level lease negotiation protocol. The exchange itself
// is out of scope here: `start` and `release` only kick work off and
// return; the result arrives later as a [`NegotiationOutcome`] on the
// completion channel the negotiator was constructed with.

use async_trait::async_trait;
use uuid::Uuid;

use crate::acquire::AcquireRequest;
use crate::lease::Lease;

/// Final outcome of one negotiation or teardown
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Negotiation succeeded; the device gained this lease
    Acquired(Lease),
    /// Negotiation failed with a reason
    Failed(String),
    /// The identified lease was released or expired
    Released(Uuid),
}

/// Out-of-band completion message for an acquire/release request
///
/// The `token` identifies the request the outcome belongs to. Completions
/// whose token no longer matches the device's current request are stray
/// events (the request was replaced or cancelled) and must be ignored.
#[derive(Debug, Clone)]
pub struct NegotiationOutcome {
    /// Device the negotiation ran for
    pub device: String,
    /// Request token assigned by the acquisition service
    pub token: u64,
    /// What happened
    pub outcome: Outcome,
}

/// Trait for lease negotiation backends
///
/// Implementations deliver completions asynchronously; both methods
/// validate and start work, returning before the exchange finishes.
#[async_trait]
pub trait Negotiator: Send + Sync {
    /// Begin negotiating a lease for a device
    async fn start(
        &self,
        device: &str,
        request: &AcquireRequest,
        token: u64,
    ) -> Result<(), crate::Error>;

    /// Begin tearing down the active lease of a device
    ///
    /// `uuid` is `None` when the caller did not pin a specific lease.
    async fn release(
        &self,
        device: &str,
        uuid: Option<Uuid>,
        token: u64,
    ) -> Result<(), crate::Error>;
}
