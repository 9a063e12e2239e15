// # netlease-core
//
// Core library for the lease-driven system settings updater.
//
// ## Architecture Overview
//
// Host-wide settings (hostname, resolver) are derived from configuration
// leases obtained per device by different protocols (DHCP, firmware,
// static assignment). This library provides:
//
// - **Lease / LeaseStore**: the lease data model and the device-owned
//   lease sets, referenced through generation-stamped handles
// - **Updater / UpdaterRegistry**: per-kind arbitration of candidate
//   sources, one authoritative source per setting kind
// - **ReconcileEngine**: the reconciliation pass driving idempotent
//   backup/install/restore through update scripts
// - **AcquisitionService**: the asynchronous per-device acquire/release
//   protocol that creates and retires leases
// - **ScriptExecutor / Negotiator**: trait seams for the external
//   collaborators (script execution, wire negotiation)
//
// ## Design Principles
//
// 1. **One authoritative source per kind**: arbitration by fixed
//    per-protocol weights, deterministic tie-breaking
// 2. **Idempotent passes**: rerunning reconciliation with unchanged
//    leases triggers zero script invocations
// 3. **Failure isolation**: one kind's failure never blocks another;
//    failed steps retry on the next pass
// 4. **Single-threaded**: pass and protocol share one event loop; no
//    concurrent mutation of updater or store state

pub mod acquire;
pub mod artifact;
pub mod config;
pub mod engine;
pub mod error;
pub mod lease;
pub mod store;
pub mod traits;
pub mod updater;

// Re-export core types for convenience
pub use acquire::{
    AcquireRequest, AcquisitionService, DeviceState, FirmwareNegotiator, LeaseEvent,
    StaticNegotiator,
};
pub use artifact::{ArtifactBuilder, BuilderRegistry, SettingsArtifact};
pub use config::{EngineConfig, ScriptSet, SettingsConfig};
pub use engine::{EngineEvent, KindOutcome, PassReport, ReconcileEngine};
pub use error::{Error, Result};
pub use lease::{AddressFamily, Lease, ProtocolKind, ResolverInfo, SettingKind, UpdateFlags};
pub use store::{LeaseHandle, LeaseStore};
pub use traits::{NegotiationOutcome, Negotiator, Outcome, ScriptAction, ScriptExecutor};
pub use updater::{Updater, UpdaterRegistry};
