//! Synthesizing negotiation backends
//!
//! Static assignment and firmware-provided boot configuration are the
//! degenerate lease protocols: there is no wire exchange, the lease is
//! synthesized directly from the request (static) or from what firmware
//! handed the boot loader (firmware, e.g. iBFT). The completion is still
//! delivered out of band, so callers observe exactly the same protocol
//! as with a real backend.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::acquire::AcquireRequest;
use crate::error::{Error, Result};
use crate::lease::{Lease, ProtocolKind};
use crate::traits::{NegotiationOutcome, Negotiator, Outcome};

/// Negotiator that grants a lease synthesized from the request
///
/// Parameterized by protocol so the static and firmware tiers share one
/// implementation; the protocol determines the arbitration weight of the
/// leases it produces.
struct SynthNegotiator {
    protocol: ProtocolKind,
    done_tx: mpsc::UnboundedSender<NegotiationOutcome>,
}

impl SynthNegotiator {
    fn deliver(&self, device: &str, completion: NegotiationOutcome) -> Result<()> {
        self.done_tx
            .send(completion)
            .map_err(|_| Error::negotiation(device, "completion channel closed"))
    }
}

#[async_trait]
impl Negotiator for SynthNegotiator {
    async fn start(&self, device: &str, request: &AcquireRequest, token: u64) -> Result<()> {
        let mut lease = Lease::new(self.protocol, request.family);
        lease.update = request.update;
        lease.hostname = request.hostname.clone();
        lease.resolver = request.resolver.clone();

        self.deliver(
            device,
            NegotiationOutcome {
                device: device.to_string(),
                token,
                outcome: Outcome::Acquired(lease),
            },
        )
    }

    async fn release(&self, device: &str, uuid: Option<Uuid>, token: u64) -> Result<()> {
        self.deliver(
            device,
            NegotiationOutcome {
                device: device.to_string(),
                token,
                outcome: Outcome::Released(uuid.unwrap_or_else(Uuid::nil)),
            },
        )
    }
}

/// Negotiator that grants a static lease built from the request
pub struct StaticNegotiator {
    inner: SynthNegotiator,
}

impl StaticNegotiator {
    /// Create a backend delivering completions on the given channel
    pub fn new(done_tx: mpsc::UnboundedSender<NegotiationOutcome>) -> Self {
        Self {
            inner: SynthNegotiator {
                protocol: ProtocolKind::Static,
                done_tx,
            },
        }
    }
}

#[async_trait]
impl Negotiator for StaticNegotiator {
    async fn start(&self, device: &str, request: &AcquireRequest, token: u64) -> Result<()> {
        self.inner.start(device, request, token).await
    }

    async fn release(&self, device: &str, uuid: Option<Uuid>, token: u64) -> Result<()> {
        self.inner.release(device, uuid, token).await
    }
}

/// Negotiator that grants a firmware-provided lease
///
/// Firmware leases outrank DHCP in arbitration, matching boot
/// configurations (iBFT) that must not be overridden by a later dynamic
/// lease.
pub struct FirmwareNegotiator {
    inner: SynthNegotiator,
}

impl FirmwareNegotiator {
    /// Create a backend delivering completions on the given channel
    pub fn new(done_tx: mpsc::UnboundedSender<NegotiationOutcome>) -> Self {
        Self {
            inner: SynthNegotiator {
                protocol: ProtocolKind::Firmware,
                done_tx,
            },
        }
    }
}

#[async_trait]
impl Negotiator for FirmwareNegotiator {
    async fn start(&self, device: &str, request: &AcquireRequest, token: u64) -> Result<()> {
        self.inner.start(device, request, token).await
    }

    async fn release(&self, device: &str, uuid: Option<Uuid>, token: u64) -> Result<()> {
        self.inner.release(device, uuid, token).await
    }
}
