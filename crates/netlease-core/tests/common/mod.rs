//! Test doubles and common utilities for architecture contract tests
//!
//! Provides call-counting doubles for the script executor and the
//! negotiation backend, plus helpers for building leases and configs.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use netlease_core::error::{Error, Result};
use netlease_core::{
    AcquireRequest, AddressFamily, BuilderRegistry, EngineEvent, Lease, NegotiationOutcome,
    Negotiator, ProtocolKind, ReconcileEngine, ResolverInfo, ScriptAction, ScriptExecutor,
    ScriptSet, SettingKind, SettingsArtifact, SettingsConfig,
};

/// One recorded script invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCall {
    pub script: String,
    pub kind: SettingKind,
    pub action: ScriptAction,
    pub artifact: Option<String>,
}

/// A mock ScriptExecutor that records calls and can inject failures
pub struct MockScriptExecutor {
    calls: Arc<Mutex<Vec<ScriptCall>>>,
    failing: Arc<Mutex<HashSet<(SettingKind, ScriptAction)>>>,
    call_count: Arc<AtomicUsize>,
}

impl MockScriptExecutor {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create an executor that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            calls: Arc::clone(&other.calls),
            failing: Arc::clone(&other.failing),
            call_count: Arc::clone(&other.call_count),
        }
    }

    /// Total number of script invocations
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// All recorded invocations, in order
    pub fn calls(&self) -> Vec<ScriptCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of invocations of one (kind, action) pair
    pub fn count_for(&self, kind: SettingKind, action: ScriptAction) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.kind == kind && call.action == action)
            .count()
    }

    /// Make future invocations of (kind, action) fail
    pub fn fail(&self, kind: SettingKind, action: ScriptAction) {
        self.failing.lock().unwrap().insert((kind, action));
    }

    /// Let future invocations of (kind, action) succeed again
    pub fn recover(&self, kind: SettingKind, action: ScriptAction) {
        self.failing.lock().unwrap().remove(&(kind, action));
    }
}

#[async_trait::async_trait]
impl ScriptExecutor for MockScriptExecutor {
    async fn run(
        &self,
        script: &str,
        kind: SettingKind,
        action: ScriptAction,
        artifact: Option<&SettingsArtifact>,
    ) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(ScriptCall {
            script: script.to_string(),
            kind,
            action,
            artifact: artifact.map(|a| a.content.clone()),
        });

        if self.failing.lock().unwrap().contains(&(kind, action)) {
            return Err(Error::script(kind, action, "injected failure"));
        }
        Ok(())
    }
}

/// A mock Negotiator that records requests and never completes on its own
///
/// Tests drive completions explicitly through
/// `AcquisitionService::handle_completion`.
pub struct MockNegotiator {
    starts: Arc<Mutex<Vec<(String, AcquireRequest, u64)>>>,
    releases: Arc<Mutex<Vec<(String, Option<Uuid>, u64)>>>,
    fail_start: Arc<Mutex<Option<String>>>,
}

impl MockNegotiator {
    pub fn new() -> Self {
        Self {
            starts: Arc::new(Mutex::new(Vec::new())),
            releases: Arc::new(Mutex::new(Vec::new())),
            fail_start: Arc::new(Mutex::new(None)),
        }
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            starts: Arc::clone(&other.starts),
            releases: Arc::clone(&other.releases),
            fail_start: Arc::clone(&other.fail_start),
        }
    }

    /// Recorded start requests, in order
    pub fn starts(&self) -> Vec<(String, AcquireRequest, u64)> {
        self.starts.lock().unwrap().clone()
    }

    /// Recorded release requests, in order
    pub fn releases(&self) -> Vec<(String, Option<Uuid>, u64)> {
        self.releases.lock().unwrap().clone()
    }

    /// Token of the most recent start request
    pub fn last_token(&self) -> u64 {
        self.starts.lock().unwrap().last().expect("a start was recorded").2
    }

    /// Make future start calls fail with the given reason
    pub fn fail_start_with(&self, reason: &str) {
        *self.fail_start.lock().unwrap() = Some(reason.to_string());
    }
}

#[async_trait::async_trait]
impl Negotiator for MockNegotiator {
    async fn start(&self, device: &str, request: &AcquireRequest, token: u64) -> Result<()> {
        if let Some(reason) = self.fail_start.lock().unwrap().clone() {
            return Err(Error::negotiation(device, reason));
        }
        self.starts
            .lock()
            .unwrap()
            .push((device.to_string(), request.clone(), token));
        Ok(())
    }

    async fn release(&self, device: &str, uuid: Option<Uuid>, token: u64) -> Result<()> {
        self.releases
            .lock()
            .unwrap()
            .push((device.to_string(), uuid, token));
        Ok(())
    }
}

/// Config with full backup/restore/install blocks for both kinds
pub fn full_config() -> SettingsConfig {
    let mut config = SettingsConfig::new();
    config.set_scripts(
        SettingKind::Hostname,
        ScriptSet::full(
            "/etc/netlease/hostname backup",
            "/etc/netlease/hostname restore",
            "/etc/netlease/hostname install",
        ),
    );
    config.set_scripts(
        SettingKind::Resolver,
        ScriptSet::full(
            "/etc/netlease/resolver backup",
            "/etc/netlease/resolver restore",
            "/etc/netlease/resolver install",
        ),
    );
    config
}

/// Build an engine over a sharing clone of the given executor
pub fn engine_with(
    executor: &MockScriptExecutor,
    config: SettingsConfig,
) -> (
    ReconcileEngine,
    tokio::sync::mpsc::Receiver<EngineEvent>,
) {
    ReconcileEngine::new(
        &config,
        BuilderRegistry::with_defaults(),
        Box::new(MockScriptExecutor::sharing_counters_with(executor)),
    )
    .expect("engine construction succeeds")
}

/// A DHCP lease carrying a hostname payload
pub fn dhcp_hostname_lease(hostname: &str) -> Lease {
    let mut lease = Lease::new(ProtocolKind::Dhcp, AddressFamily::Ipv4);
    lease.update.insert(SettingKind::Hostname);
    lease.hostname = Some(hostname.to_string());
    lease
}

/// A firmware lease carrying a hostname payload
pub fn firmware_hostname_lease(hostname: &str) -> Lease {
    let mut lease = Lease::new(ProtocolKind::Firmware, AddressFamily::Ipv4);
    lease.update.insert(SettingKind::Hostname);
    lease.hostname = Some(hostname.to_string());
    lease
}

/// A DHCP lease carrying a resolver payload
pub fn dhcp_resolver_lease(server: &str) -> Lease {
    let mut lease = Lease::new(ProtocolKind::Dhcp, AddressFamily::Ipv4);
    lease.update.insert(SettingKind::Resolver);
    lease.resolver = Some(ResolverInfo {
        default_domain: None,
        servers: vec![server.parse().expect("valid address")],
        search: Vec::new(),
    });
    lease
}

/// A successful-acquisition completion for a device
pub fn acquired(device: &str, token: u64, lease: Lease) -> NegotiationOutcome {
    NegotiationOutcome {
        device: device.to_string(),
        token,
        outcome: netlease_core::Outcome::Acquired(lease),
    }
}
