//! Asynchronous lease acquisition protocol
//!
//! Per-device acquire/release protocol feeding the lease store. The
//! caller's view is non-blocking: `acquire` and `release` validate input
//! and start work, returning before completion. The actual exchange is
//! driven by a [`Negotiator`] backend, and its result arrives later as a
//! [`NegotiationOutcome`] which the owning event loop feeds back through
//! [`AcquisitionService::handle_completion`].
//!
//! ## Device states
//!
//! ```text
//! Idle → Acquiring → Bound → Releasing → Idle
//! ```
//!
//! - Re-calling `acquire` while Acquiring/Bound replaces the in-flight
//!   request: at most one negotiation per device, never two. A bound
//!   lease displaced this way stays in the store until the replacing
//!   request completes, then is retired; if the replacement fails, the
//!   device falls back to the still-stored lease.
//! - Every request carries a token; a completion whose token no longer
//!   matches the device's current request is a stray event (the request
//!   was replaced or cancelled) and is ignored, not applied.
//! - Observers subscribe to a broadcast channel of [`LeaseEvent`]s;
//!   cancellation means dropping the subscription.

mod static_lease;

pub use static_lease::{FirmwareNegotiator, StaticNegotiator};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::lease::{AddressFamily, ResolverInfo, UpdateFlags};
use crate::store::LeaseStore;
use crate::traits::{NegotiationOutcome, Negotiator, Outcome};

/// Length of the wire-format lease identifier
pub const LEASE_ID_LEN: usize = 16;

/// Parsed acquire request
///
/// Built from the caller's options mapping; unknown keys are rejected as
/// malformed input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcquireRequest {
    /// Address family to negotiate for
    #[serde(default = "default_family")]
    pub family: AddressFamily,

    /// Setting kinds the resulting lease may drive
    #[serde(default = "UpdateFlags::all")]
    pub update: UpdateFlags,

    /// Hostname to request from the configuration source
    #[serde(default)]
    pub hostname: Option<String>,

    /// Resolver configuration to request (static assignment)
    #[serde(default)]
    pub resolver: Option<ResolverInfo>,

    /// Negotiation timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_family() -> AddressFamily {
    AddressFamily::Ipv4
}

impl AcquireRequest {
    /// Parse the caller's options mapping
    ///
    /// An empty or non-object mapping is malformed: the request payload
    /// is required even when every field takes its default.
    pub fn from_options(options: &serde_json::Value) -> Result<Self> {
        let map = options
            .as_object()
            .ok_or_else(|| Error::invalid_argument("acquire options must be a mapping"))?;
        if map.is_empty() {
            return Err(Error::invalid_argument("missing acquire options"));
        }

        serde_json::from_value(options.clone())
            .map_err(|err| Error::invalid_argument(format!("malformed acquire options: {err}")))
    }
}

/// Lifecycle state of one device's negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    /// No lease and no negotiation in flight
    Idle,
    /// A negotiation was started and has not completed
    Acquiring,
    /// The device holds the identified lease
    Bound { lease: Uuid },
    /// Teardown of the active lease was initiated
    Releasing,
}

/// Asynchronous notification delivered to device observers
#[derive(Debug, Clone)]
pub struct LeaseEvent {
    /// Device the event concerns
    pub device: String,
    /// What happened; carries the lease contents on success
    pub outcome: Outcome,
}

#[derive(Debug)]
struct DeviceSlot {
    name: String,
    state: DeviceState,
    /// Token of the current request; completions carrying any other
    /// token are stray
    token: u64,
    /// Store-resident lease whose retirement is pending: displaced by a
    /// replacing acquisition or targeted by an in-flight release
    replacing: Option<Uuid>,
}

/// Per-device acquire/release protocol service
///
/// Single-threaded: shares the event-processing context with the
/// reconciliation engine. Any lease gained, expired, or released mutates
/// the store through [`handle_completion`](Self::handle_completion),
/// whose `true` return tells the owning loop to schedule a
/// reconciliation pass.
pub struct AcquisitionService {
    negotiator: Box<dyn Negotiator>,
    slots: HashMap<String, DeviceSlot>,
    next_token: u64,
    notify_tx: broadcast::Sender<LeaseEvent>,
}

impl AcquisitionService {
    /// Create a service over the given negotiation backend
    pub fn new(negotiator: Box<dyn Negotiator>) -> Self {
        let (notify_tx, _) = broadcast::channel(64);
        Self {
            negotiator,
            slots: HashMap::new(),
            next_token: 0,
            notify_tx,
        }
    }

    /// Register a device with the service; idempotent
    pub fn register_device(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.slots.entry(name.clone()).or_insert(DeviceSlot {
            name,
            state: DeviceState::Idle,
            token: 0,
            replacing: None,
        });
    }

    /// Read-only device name property
    pub fn device_name(&self, device: &str) -> Option<&str> {
        self.slots.get(device).map(|slot| slot.name.as_str())
    }

    /// Current protocol state of a device
    pub fn state(&self, device: &str) -> Option<&DeviceState> {
        self.slots.get(device).map(|slot| &slot.state)
    }

    /// Subscribe to lease notifications for all devices
    pub fn subscribe(&self) -> broadcast::Receiver<LeaseEvent> {
        self.notify_tx.subscribe()
    }

    /// Subscribe as a `Stream`, for select-loop composition
    pub fn lease_stream(&self) -> BroadcastStream<LeaseEvent> {
        BroadcastStream::new(self.notify_tx.subscribe())
    }

    /// Acquire a lease for a device
    ///
    /// Validates the options mapping and starts negotiation, returning
    /// before completion; callers must not assume the device is bound
    /// when this returns. Re-acquiring while a request is in flight
    /// replaces it.
    pub async fn acquire(&mut self, device: &str, options: &serde_json::Value) -> Result<()> {
        let request = AcquireRequest::from_options(options)?;

        let slot = self
            .slots
            .get_mut(device)
            .ok_or_else(|| Error::invalid_argument(format!("unknown device {device}")))?;

        self.next_token += 1;
        let token = self.next_token;

        let prev_state = slot.state.clone();
        let prev_token = slot.token;
        let prev_replacing = slot.replacing;

        match &slot.state {
            DeviceState::Idle => slot.replacing = None,
            DeviceState::Bound { lease } => {
                debug!("{device}: replacing bound lease {lease}");
                slot.replacing = Some(*lease);
            }
            // A displaced lease from an earlier replace/release stays
            // pending retirement across the new request
            _ => debug!("{device}: replacing in-flight request (token {})", slot.token),
        }
        slot.token = token;
        slot.state = DeviceState::Acquiring;

        if let Err(err) = self.negotiator.start(device, &request, token).await {
            // Nothing was started: put the slot back the way it was, so
            // a bound device keeps its lease
            let slot = self.slots.get_mut(device).expect("slot exists");
            slot.state = prev_state;
            slot.token = prev_token;
            slot.replacing = prev_replacing;
            return Err(match err {
                err @ Error::Negotiation { .. } => err,
                other => Error::negotiation(device, other.to_string()),
            });
        }

        // Negotiation is now in flight. It completes asynchronously and
        // the result is delivered to observers as a LeaseEvent.
        Ok(())
    }

    /// Release a device's lease
    ///
    /// A non-nil identifier releases only the matching lease, guarding
    /// against releasing a lease a concurrent caller already replaced;
    /// `None` (or a nil identifier at the wire level) releases whichever
    /// lease is active. Success means teardown was initiated.
    pub async fn release(&mut self, device: &str, uuid: Option<Uuid>) -> Result<()> {
        let slot = self
            .slots
            .get_mut(device)
            .ok_or_else(|| Error::invalid_argument(format!("unknown device {device}")))?;

        let target = match (&slot.state, uuid) {
            (DeviceState::Idle, _) => {
                return Err(Error::negotiation(
                    device,
                    "no active lease or negotiation to release",
                ));
            }
            (DeviceState::Releasing, _) => {
                return Err(Error::negotiation(device, "release already in progress"));
            }
            (DeviceState::Bound { lease }, Some(requested)) => {
                if *lease != requested {
                    return Err(Error::negotiation(
                        device,
                        "lease identifier does not match the active lease",
                    ));
                }
                Some(*lease)
            }
            (DeviceState::Bound { lease }, None) => Some(*lease),
            (DeviceState::Acquiring, Some(requested)) => {
                // While a replacing acquisition is in flight, the
                // displaced lease is still the active one
                if slot.replacing != Some(requested) {
                    return Err(Error::negotiation(
                        device,
                        "lease identifier does not match the active lease",
                    ));
                }
                Some(requested)
            }
            (DeviceState::Acquiring, None) => slot.replacing,
        };

        self.next_token += 1;
        let token = self.next_token;

        let prev_state = slot.state.clone();
        let prev_token = slot.token;
        let prev_replacing = slot.replacing;

        slot.token = token;
        slot.state = DeviceState::Releasing;
        slot.replacing = target;

        if let Err(err) = self.negotiator.release(device, target, token).await {
            let slot = self.slots.get_mut(device).expect("slot exists");
            slot.state = prev_state;
            slot.token = prev_token;
            slot.replacing = prev_replacing;
            return Err(match err {
                err @ Error::Negotiation { .. } => err,
                other => Error::negotiation(device, other.to_string()),
            });
        }

        Ok(())
    }

    /// Wire-shaped `drop` method: optional 16-byte lease identifier
    ///
    /// An identifier that is present but not exactly 16 bytes is an
    /// invalid argument; an all-zero identifier means "whichever lease
    /// is active".
    pub async fn drop_lease(&mut self, device: &str, identifier: Option<&[u8]>) -> Result<()> {
        let uuid = match identifier {
            None => None,
            Some(bytes) => {
                if bytes.len() != LEASE_ID_LEN {
                    return Err(Error::invalid_argument("bad uuid argument"));
                }
                let uuid = Uuid::from_slice(bytes)
                    .map_err(|_| Error::invalid_argument("bad uuid argument"))?;
                if uuid.is_nil() { None } else { Some(uuid) }
            }
        };

        self.release(device, uuid).await
    }

    /// Apply a negotiation completion
    ///
    /// Returns `true` when the device's lease set changed and the caller
    /// should schedule a reconciliation pass. Stray completions (unknown
    /// device or stale token) are ignored.
    pub fn handle_completion(
        &mut self,
        store: &mut LeaseStore,
        completion: NegotiationOutcome,
    ) -> bool {
        let Some(slot) = self.slots.get_mut(&completion.device) else {
            debug!("completion for unknown device {}, ignoring", completion.device);
            return false;
        };
        if completion.token != slot.token {
            debug!(
                "{}: stray completion (token {} != {}), ignoring",
                completion.device, completion.token, slot.token
            );
            return false;
        }

        match completion.outcome {
            Outcome::Acquired(lease) => {
                // Retire the lease this request displaced, if any is left
                if let Some(old) = slot.replacing.take() {
                    store.remove_by_uuid(&completion.device, old);
                }

                let handle = store.insert(&completion.device, lease);
                let lease = store
                    .get(handle)
                    .cloned()
                    .expect("freshly inserted lease resolves");
                info!(
                    "{}: acquired {:?} lease (seqno {})",
                    completion.device, lease.protocol, lease.seqno
                );
                slot.state = DeviceState::Bound { lease: lease.uuid };
                self.notify(LeaseEvent {
                    device: completion.device,
                    outcome: Outcome::Acquired(lease),
                });
                true
            }
            Outcome::Failed(reason) => {
                warn!("{}: negotiation failed: {reason}", completion.device);
                // A failed replacement falls back to the displaced lease,
                // which never left the store
                slot.state = match slot.replacing.take() {
                    Some(old) => DeviceState::Bound { lease: old },
                    None => DeviceState::Idle,
                };
                self.notify(LeaseEvent {
                    device: completion.device,
                    outcome: Outcome::Failed(reason),
                });
                false
            }
            Outcome::Released(uuid) => {
                let removed = store.remove_by_uuid(&completion.device, uuid).is_some();
                if removed {
                    info!("{}: released lease {uuid}", completion.device);
                }
                slot.replacing = None;
                slot.state = DeviceState::Idle;
                self.notify(LeaseEvent {
                    device: completion.device,
                    outcome: Outcome::Released(uuid),
                });
                removed
            }
        }
    }

    /// Deliver a notification to device observers
    fn notify(&self, event: LeaseEvent) {
        // No receivers is fine; observers come and go
        let _ = self.notify_tx.send(event);
    }
}
