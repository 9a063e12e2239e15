//! Configuration types for the netlease system
//!
//! Per setting kind, an optional block names up to three external
//! scripts. Normalization rules (applied when the updater registry is
//! built):
//!
//! - no block → the kind stays disabled
//! - block without an install script → the kind is disabled, with a
//!   warning
//! - install present but backup or restore missing → both backup and
//!   restore are dropped, leaving unconditional install

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lease::SettingKind;

/// Main configuration for the settings updater
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Hostname updater scripts
    #[serde(default)]
    pub hostname: Option<ScriptSet>,

    /// Resolver updater scripts
    #[serde(default)]
    pub resolver: Option<ScriptSet>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SettingsConfig {
    /// Create a configuration with no kind enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// The configured script block for a kind, if any
    pub fn scripts(&self, kind: SettingKind) -> Option<&ScriptSet> {
        match kind {
            SettingKind::Hostname => self.hostname.as_ref(),
            SettingKind::Resolver => self.resolver.as_ref(),
        }
    }

    /// Set the script block for a kind
    pub fn set_scripts(&mut self, kind: SettingKind, scripts: ScriptSet) {
        match kind {
            SettingKind::Hostname => self.hostname = Some(scripts),
            SettingKind::Resolver => self.resolver = Some(scripts),
        }
    }

    /// Kinds that will end up enabled after normalization
    pub fn enabled_kinds(&self) -> Vec<SettingKind> {
        SettingKind::ALL
            .iter()
            .copied()
            .filter(|kind| {
                self.scripts(*kind)
                    .is_some_and(|scripts| scripts.install.is_some())
            })
            .collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for kind in SettingKind::ALL {
            if let Some(scripts) = self.scripts(kind) {
                scripts.validate(kind)?;
            }
        }
        self.engine.validate()?;
        Ok(())
    }
}

/// Script block for one setting kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptSet {
    /// Script saving the pre-lease settings
    #[serde(default)]
    pub backup: Option<String>,

    /// Script putting the saved settings back
    #[serde(default)]
    pub restore: Option<String>,

    /// Script applying the rendered settings artifact
    #[serde(default)]
    pub install: Option<String>,
}

impl ScriptSet {
    /// An install-only block
    pub fn install_only(install: impl Into<String>) -> Self {
        Self {
            backup: None,
            restore: None,
            install: Some(install.into()),
        }
    }

    /// A full backup/restore/install block
    pub fn full(
        backup: impl Into<String>,
        restore: impl Into<String>,
        install: impl Into<String>,
    ) -> Self {
        Self {
            backup: Some(backup.into()),
            restore: Some(restore.into()),
            install: Some(install.into()),
        }
    }

    fn validate(&self, kind: SettingKind) -> Result<()> {
        for (name, script) in [
            ("backup", &self.backup),
            ("restore", &self.restore),
            ("install", &self.install),
        ] {
            if let Some(script) = script
                && script.is_empty()
            {
                return Err(crate::Error::config(format!(
                    "{kind} updater: {name} script path cannot be empty"
                )));
            }
        }
        Ok(())
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log). This
    /// keeps memory bounded under lease churn.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    fn validate(&self) -> Result<()> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config(
                "engine event channel capacity must be > 0",
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}
