//! Per-kind updaters and source arbitration
//!
//! One [`Updater`] exists per setting kind. It owns the list of candidate
//! [`UpdaterSource`]s, the sequence number currently in effect, and the
//! backup flag. The [`UpdaterRegistry`] is an explicit object constructed
//! once at startup from configuration and passed by reference into the
//! reconciliation engine; there is no process-global updater state.

use tracing::warn;

use crate::artifact::BuilderRegistry;
use crate::config::SettingsConfig;
use crate::error::Result;
use crate::lease::{Lease, SettingKind};
use crate::store::LeaseHandle;

/// Sequence number sentinel meaning "nothing installed"
pub const SEQNO_NONE: u64 = 0;

/// Per-(kind, lease) arbitration record
///
/// The handle is cleared at the start of every reconciliation pass and
/// refreshed when the lease is seen again; a source whose handle stays
/// empty across a pass is pruned.
#[derive(Debug, Clone, Copy)]
pub struct UpdaterSource {
    /// Sequence number copied from the lease at registration
    pub seqno: u64,
    /// Computed priority weight
    pub weight: u32,
    /// Reference to the lease; `None` = not seen this pass
    pub handle: Option<LeaseHandle>,
}

/// Scripts resolved for one enabled kind
#[derive(Debug, Clone)]
pub struct UpdaterScripts {
    /// Install script; always present for an enabled kind
    pub install: String,
    /// Backup script, if backup/restore is available
    pub backup: Option<String>,
    /// Restore script, if backup/restore is available
    pub restore: Option<String>,
}

/// Arbitration and apply state for one setting kind
#[derive(Debug)]
pub struct Updater {
    /// Setting kind this updater manages
    pub kind: SettingKind,
    /// Candidate sources, in registration order
    sources: Vec<UpdaterSource>,
    /// Sequence number currently in effect; [`SEQNO_NONE`] = none
    pub installed_seqno: u64,
    /// True iff a backup succeeded and no restore has succeeded since
    pub have_backup: bool,
    /// Whether this kind participates in reconciliation
    pub enabled: bool,
    /// Resolved scripts; `None` while disabled
    pub scripts: Option<UpdaterScripts>,
}

impl Updater {
    fn new(kind: SettingKind) -> Self {
        Self {
            kind,
            sources: Vec::new(),
            installed_seqno: SEQNO_NONE,
            have_backup: false,
            enabled: false,
            scripts: None,
        }
    }

    /// Record that the given lease can drive this kind
    ///
    /// Idempotent: a source already registered for the lease's seqno has
    /// its handle refreshed instead of being duplicated.
    pub fn add_source(&mut self, lease: &Lease, handle: LeaseHandle) {
        for source in &mut self.sources {
            if source.seqno == lease.seqno {
                // This lease is still there
                source.handle = Some(handle);
                return;
            }
        }

        self.sources.push(UpdaterSource {
            seqno: lease.seqno,
            weight: lease.weight(),
            handle: Some(handle),
        });
    }

    /// Mark every source unseen ahead of a rescan
    pub fn clear_seen(&mut self) {
        for source in &mut self.sources {
            source.handle = None;
        }
    }

    /// Drop sources whose lease went away, returning how many were pruned
    pub fn prune_unseen(&mut self) -> usize {
        let before = self.sources.len();
        self.sources.retain(|source| source.handle.is_some());
        before - self.sources.len()
    }

    /// Select the best source for updating the system settings
    ///
    /// Pure: returns the source of strictly maximal weight among those
    /// with a live lease reference; ties resolve to the earliest
    /// registered source. `None` if no source qualifies.
    pub fn select_source(&self) -> Option<&UpdaterSource> {
        let mut best: Option<&UpdaterSource> = None;
        for source in &self.sources {
            if source.handle.is_none() {
                continue;
            }
            match best {
                Some(current) if source.weight > current.weight => best = Some(source),
                None => best = Some(source),
                _ => {}
            }
        }
        best
    }

    /// Current number of registered sources
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

/// Registry of one updater per setting kind
///
/// Constructed once at startup; the builder registry must cover every
/// kind the configuration enables, so a missing artifact builder is a
/// startup error rather than a first-install surprise.
#[derive(Debug)]
pub struct UpdaterRegistry {
    updaters: Vec<Updater>,
}

impl UpdaterRegistry {
    /// Build the registry from configuration
    ///
    /// Normalization mirrors the config rules: a block without an install
    /// script leaves the kind disabled; install without both backup and
    /// restore drops backup/restore, leaving unconditional install.
    pub fn from_config(config: &SettingsConfig, builders: &BuilderRegistry) -> Result<Self> {
        let mut updaters: Vec<Updater> =
            SettingKind::ALL.iter().map(|kind| Updater::new(*kind)).collect();

        for updater in &mut updaters {
            let Some(scripts) = config.scripts(updater.kind) else {
                continue;
            };

            let Some(install) = scripts.install.clone() else {
                warn!(
                    "{}-updater configured, but no install script defined",
                    updater.kind
                );
                continue;
            };

            let (backup, restore) = match (scripts.backup.clone(), scripts.restore.clone()) {
                (Some(backup), Some(restore)) => (Some(backup), Some(restore)),
                (None, None) => (None, None),
                _ => {
                    warn!(
                        "{}-updater configured, but no backup/restore script defined",
                        updater.kind
                    );
                    (None, None)
                }
            };

            updater.enabled = true;
            updater.scripts = Some(UpdaterScripts {
                install,
                backup,
                restore,
            });
        }

        builders.validate_coverage(
            updaters
                .iter()
                .filter(|updater| updater.enabled)
                .map(|updater| &updater.kind),
        )?;

        Ok(Self { updaters })
    }

    /// The updater for a kind
    pub fn get(&self, kind: SettingKind) -> &Updater {
        &self.updaters[kind.index()]
    }

    /// Mutable access to the updater for a kind
    pub fn get_mut(&mut self, kind: SettingKind) -> &mut Updater {
        &mut self.updaters[kind.index()]
    }

    /// Iterate over all updaters
    pub fn iter(&self) -> impl Iterator<Item = &Updater> {
        self.updaters.iter()
    }

    /// Iterate mutably over all updaters
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Updater> {
        self.updaters.iter_mut()
    }
}
