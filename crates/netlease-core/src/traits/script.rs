// # Script Executor Trait
//
// Defines the interface for invoking the external update scripts that
// back up, restore, or install host-wide settings for one kind.
//
// ## Implementations
//
// - External commands: `netlease-script` crate
// - Test doubles: `tests/common/mod.rs`

use async_trait::async_trait;
use std::fmt;

use crate::artifact::SettingsArtifact;
use crate::lease::SettingKind;

/// Which of the three per-kind scripts is being invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptAction {
    /// Save the current system settings before the first install
    Backup,
    /// Put the saved settings back once no lease remains
    Restore,
    /// Apply settings built from the winning lease
    Install,
}

impl ScriptAction {
    /// Name exported to the script environment and used in log messages
    pub fn name(self) -> &'static str {
        match self {
            ScriptAction::Backup => "backup",
            ScriptAction::Restore => "restore",
            ScriptAction::Install => "install",
        }
    }
}

impl fmt::Display for ScriptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Trait for update-script execution
///
/// The engine treats script execution as an opaque invoke-and-get-result
/// step: the executor runs the named script and reports success or
/// failure. Invocation blocks the reconciliation pass for the duration of
/// the call; kinds are applied one at a time.
///
/// # Idempotency
///
/// Scripts are invoked idempotently by the engine: a failed action is
/// retried with identical inputs on the next pass. Implementations must
/// not add retry logic of their own; they report the outcome and the
/// engine decides.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Run one script action for one setting kind
    ///
    /// # Parameters
    ///
    /// - `script`: configured script path or command
    /// - `kind`: setting kind being processed
    /// - `action`: which step this is
    /// - `artifact`: rendered settings content; present for install only
    ///
    /// # Returns
    ///
    /// - `Ok(())`: the script reported success
    /// - `Err(Error)`: the script failed or could not be run
    async fn run(
        &self,
        script: &str,
        kind: SettingKind,
        action: ScriptAction,
        artifact: Option<&SettingsArtifact>,
    ) -> Result<(), crate::Error>;
}
