//! Core reconciliation engine
//!
//! The ReconcileEngine is responsible for:
//! - Rescanning all devices and leases on each pass
//! - Feeding qualifying leases into each kind's updater
//! - Arbitrating one authoritative source per kind
//! - Driving idempotent backup/install/restore through the script executor
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  LeaseStore  │─── devices & leases ──┐
//! └──────────────┘                       │
//!                                        ▼
//!                             ┌──────────────────┐
//!                             │ ReconcileEngine  │
//!                             └──────────────────┘
//!                                        │
//!          ┌─────────────────────────────┼─────────────────────────┐
//!          │                             │                         │
//!          ▼                             ▼                         ▼
//! ┌─────────────────┐         ┌──────────────────┐         ┌─────────────┐
//! │ UpdaterRegistry │         │  ScriptExecutor  │         │   Events    │
//! │ (arbitrate)     │         │ (apply/restore)  │         │  (notify)   │
//! └─────────────────┘         └──────────────────┘         └─────────────┘
//! ```
//!
//! ## Pass Flow
//!
//! 1. Mark every registered source unseen
//! 2. Rescan all leases, re-marking or registering sources
//! 3. Prune sources whose lease went away
//! 4. Per enabled kind: no source → restore; new winner → backup then
//!    install; unchanged winner → no-op
//!
//! A failure applying one kind never blocks the others; the pass
//! aggregates per-kind outcomes into a [`PassReport`].

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::artifact::BuilderRegistry;
use crate::config::SettingsConfig;
use crate::error::{Error, Result};
use crate::lease::{Lease, SettingKind};
use crate::store::LeaseStore;
use crate::traits::{ScriptAction, ScriptExecutor};
use crate::updater::{SEQNO_NONE, UpdaterRegistry};

/// Events emitted by the ReconcileEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A pass finished; counts of kinds that changed and that failed
    PassCompleted { changed: usize, failed: usize },

    /// Settings for a kind were installed from the winning lease
    Installed { kind: SettingKind, seqno: u64 },

    /// Install script failed; retried next pass
    InstallFailed { kind: SettingKind, error: String },

    /// Backup script failed; install was not attempted
    BackupFailed { kind: SettingKind, error: String },

    /// Prior settings were restored; no source remains for the kind
    Restored { kind: SettingKind },

    /// Restore script failed; retried next pass
    RestoreFailed { kind: SettingKind, error: String },

    /// The kind was permanently disabled
    KindDisabled { kind: SettingKind, reason: String },
}

/// Outcome of processing one kind within a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindOutcome {
    /// Winner unchanged, or nothing to do
    Unchanged,
    /// Settings installed from the source with this seqno
    Installed { seqno: u64 },
    /// Prior settings restored
    Restored,
    /// Backup failed; install withheld
    BackupFailed,
    /// Install failed; seqno left unchanged
    InstallFailed,
    /// Restore failed; backup flag left set
    RestoreFailed,
    /// Kind permanently disabled during this pass
    Disabled,
}

impl KindOutcome {
    /// Whether the outcome is a failure to be retried
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            KindOutcome::BackupFailed
                | KindOutcome::InstallFailed
                | KindOutcome::RestoreFailed
                | KindOutcome::Disabled
        )
    }
}

/// Aggregated per-kind outcomes of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Outcome per processed (enabled) kind
    pub outcomes: Vec<(SettingKind, KindOutcome)>,
}

impl PassReport {
    /// Whether every kind processed cleanly
    pub fn all_ok(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| !outcome.is_failure())
    }

    /// Number of kinds whose system settings changed this pass
    pub fn changed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| {
                matches!(
                    outcome,
                    KindOutcome::Installed { .. } | KindOutcome::Restored
                )
            })
            .count()
    }

    /// The outcome recorded for a kind, if it was processed
    pub fn outcome(&self, kind: SettingKind) -> Option<&KindOutcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| outcome)
    }
}

/// Core reconciliation engine
///
/// Single-threaded: the pass and the acquisition protocol share one
/// event-processing context, so the engine takes `&mut self` and a shared
/// reference to the lease store. Script invocation blocks the pass for
/// the duration of the call; kinds are applied one at a time.
pub struct ReconcileEngine {
    /// Per-kind updaters, built once from configuration
    registry: UpdaterRegistry,

    /// Artifact builders per kind
    builders: BuilderRegistry,

    /// Update-script executor
    executor: Box<dyn ScriptExecutor>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ReconcileEngine {
    /// Create a new engine
    ///
    /// Validates the configuration, builds the updater registry, and
    /// checks that every enabled kind has an artifact builder.
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields
    /// engine events.
    pub fn new(
        config: &SettingsConfig,
        builders: BuilderRegistry,
        executor: Box<dyn ScriptExecutor>,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let registry = UpdaterRegistry::from_config(config, &builders)?;
        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            registry,
            builders,
            executor,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Read access to the updater registry (state inspection)
    pub fn registry(&self) -> &UpdaterRegistry {
        &self.registry
    }

    /// Run one full reconciliation pass over all devices
    pub async fn reconcile_all(&mut self, store: &LeaseStore) -> Result<PassReport> {
        for updater in self.registry.iter_mut() {
            updater.clear_seen();
        }

        for (handle, lease) in store.iter() {
            for kind in SettingKind::ALL {
                if lease.can_update(kind) {
                    self.registry.get_mut(kind).add_source(lease, handle);
                }
            }
        }

        let mut report = PassReport::default();
        for kind in SettingKind::ALL {
            // Purge all updater sources for which the lease went away.
            // Disabling is terminal here, so pruning applies to disabled
            // updaters as well; their stale entries would never win again.
            let pruned = self.registry.get_mut(kind).prune_unseen();
            if pruned > 0 {
                debug!("{kind}: pruned {pruned} stale source(s)");
            }

            if !self.registry.get(kind).enabled {
                continue;
            }

            let outcome = self.apply_kind(kind, store).await;
            report.outcomes.push((kind, outcome));
        }

        self.emit_event(EngineEvent::PassCompleted {
            changed: report.changed(),
            failed: report
                .outcomes
                .iter()
                .filter(|(_, outcome)| outcome.is_failure())
                .count(),
        });

        Ok(report)
    }

    /// Run a full pass after the caller has already mutated a device's
    /// lease set
    pub async fn on_lease_changed(&mut self, store: &LeaseStore) -> Result<PassReport> {
        self.reconcile_all(store).await
    }

    /// Process one enabled kind: select, then restore / install / no-op
    async fn apply_kind(&mut self, kind: SettingKind, store: &LeaseStore) -> KindOutcome {
        let updater = self.registry.get(kind);
        let installed_seqno = updater.installed_seqno;
        let selected = updater
            .select_source()
            .and_then(|source| source.handle.map(|handle| (source.seqno, handle)));

        match selected {
            None => self.restore(kind).await,
            Some((seqno, _)) if seqno == installed_seqno => KindOutcome::Unchanged,
            Some((seqno, handle)) => {
                // The handle was refreshed during this pass, so it still
                // resolves; a stale handle cannot win selection.
                let Some(lease) = store.get(handle).cloned() else {
                    warn!("{kind}: winning lease vanished mid-pass");
                    return KindOutcome::Unchanged;
                };
                self.install(kind, seqno, &lease).await
            }
        }
    }

    /// Restore the pre-lease settings for a kind
    ///
    /// No-op success when no backup was taken. On success the backup flag
    /// clears and the installed seqno resets to the not-installed
    /// sentinel; on failure both are left for retry on the next pass.
    async fn restore(&mut self, kind: SettingKind) -> KindOutcome {
        let updater = self.registry.get(kind);
        if !updater.have_backup {
            return KindOutcome::Unchanged;
        }

        let Some(script) = updater
            .scripts
            .as_ref()
            .and_then(|scripts| scripts.restore.clone())
        else {
            return KindOutcome::Unchanged;
        };

        match self
            .executor
            .run(&script, kind, ScriptAction::Restore, None)
            .await
        {
            Ok(()) => {
                let updater = self.registry.get_mut(kind);
                updater.have_backup = false;
                updater.installed_seqno = SEQNO_NONE;
                info!("restored system default {kind} settings");
                self.emit_event(EngineEvent::Restored { kind });
                KindOutcome::Restored
            }
            Err(err) => {
                error!("failed to restore current {kind} settings: {err}");
                self.emit_event(EngineEvent::RestoreFailed {
                    kind,
                    error: err.to_string(),
                });
                KindOutcome::RestoreFailed
            }
        }
    }

    /// Install settings from a winning lease, backing up first if needed
    async fn install(&mut self, kind: SettingKind, seqno: u64, lease: &Lease) -> KindOutcome {
        if !self.registry.get(kind).have_backup {
            if let Some(outcome) = self.backup(kind).await {
                return outcome;
            }
        }

        let Some(builder) = self.builders.get(kind) else {
            // Closed set of artifact formats: no builder means this kind
            // can never install. Fatal for the kind, not the process.
            let err = Error::UnsupportedKind(kind);
            error!("{err}");
            let updater = self.registry.get_mut(kind);
            updater.enabled = false;
            self.emit_event(EngineEvent::KindDisabled {
                kind,
                reason: err.to_string(),
            });
            return KindOutcome::Disabled;
        };

        let artifact = match builder.build(lease) {
            Ok(artifact) => artifact,
            Err(err) => {
                error!("cannot build {kind} settings from lease: {err}");
                self.emit_event(EngineEvent::InstallFailed {
                    kind,
                    error: err.to_string(),
                });
                return KindOutcome::InstallFailed;
            }
        };

        let script = self
            .registry
            .get(kind)
            .scripts
            .as_ref()
            .map(|scripts| scripts.install.clone())
            .unwrap_or_default();

        match self
            .executor
            .run(&script, kind, ScriptAction::Install, Some(&artifact))
            .await
        {
            Ok(()) => {
                self.registry.get_mut(kind).installed_seqno = seqno;
                info!("installed new {kind} settings (seqno {seqno})");
                self.emit_event(EngineEvent::Installed { kind, seqno });
                KindOutcome::Installed { seqno }
            }
            Err(err) => {
                error!("failed to install new {kind} settings: {err}");
                self.emit_event(EngineEvent::InstallFailed {
                    kind,
                    error: err.to_string(),
                });
                KindOutcome::InstallFailed
            }
        }
    }

    /// Take the pre-lease backup for a kind
    ///
    /// Returns `None` when install may proceed (backup succeeded or no
    /// backup script is configured), or `Some(outcome)` when the pass
    /// must stop processing this kind.
    async fn backup(&mut self, kind: SettingKind) -> Option<KindOutcome> {
        let updater = self.registry.get(kind);
        let script = updater
            .scripts
            .as_ref()
            .and_then(|scripts| scripts.backup.clone())?;

        match self
            .executor
            .run(&script, kind, ScriptAction::Backup, None)
            .await
        {
            Ok(()) => {
                self.registry.get_mut(kind).have_backup = true;
                None
            }
            Err(err) => {
                error!("failed to back up current {kind} settings: {err}");
                self.emit_event(EngineEvent::BackupFailed {
                    kind,
                    error: err.to_string(),
                });
                Some(KindOutcome::BackupFailed)
            }
        }
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            // Channel full: drop rather than grow without bound
            warn!("event channel full, dropping event");
        }
    }
}
