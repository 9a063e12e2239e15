//! External-command script executor
//!
//! Runs the configured backup/restore/install scripts as child
//! processes. The script string is a program path followed by optional
//! whitespace-separated arguments. The action and setting kind are
//! exported as `NETLEASE_ACTION` and `NETLEASE_KIND`; for install, the
//! rendered settings artifact is fed to the script on stdin.
//!
//! The executor is deliberately dumb: it spawns, waits, and maps the
//! exit status to success or failure. Retry decisions belong to the
//! reconciliation engine.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use netlease_core::error::{Error, Result};
use netlease_core::{ScriptAction, ScriptExecutor, SettingKind, SettingsArtifact};

/// Executor spawning one child process per script invocation
#[derive(Debug, Default, Clone)]
pub struct ExecScriptExecutor;

impl ExecScriptExecutor {
    /// Create a new executor
    pub fn new() -> Self {
        Self
    }

    fn command_for(script: &str, kind: SettingKind, action: ScriptAction) -> Result<Command> {
        let mut parts = script.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::script(kind, action, "empty script command"))?;

        let mut command = Command::new(program);
        command
            .args(parts)
            .env("NETLEASE_ACTION", action.name())
            .env("NETLEASE_KIND", kind.name())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        Ok(command)
    }
}

#[async_trait]
impl ScriptExecutor for ExecScriptExecutor {
    async fn run(
        &self,
        script: &str,
        kind: SettingKind,
        action: ScriptAction,
        artifact: Option<&SettingsArtifact>,
    ) -> Result<()> {
        debug!("running {kind} {action} script: {script}");

        let mut command = Self::command_for(script, kind, action)?;
        if artifact.is_some() {
            command.stdin(Stdio::piped());
        }

        let mut child = command
            .spawn()
            .map_err(|err| Error::script(kind, action, format!("cannot execute: {err}")))?;

        if let Some(artifact) = artifact {
            let mut stdin = child.stdin.take().ok_or_else(|| {
                Error::script(kind, action, "failed to open script stdin")
            })?;
            stdin
                .write_all(artifact.content.as_bytes())
                .await
                .map_err(|err| {
                    Error::script(kind, action, format!("cannot write artifact: {err}"))
                })?;
            // Close stdin so the script sees EOF
            drop(stdin);
        }

        let status = child
            .wait()
            .await
            .map_err(|err| Error::script(kind, action, format!("wait failed: {err}")))?;

        if !status.success() {
            return Err(Error::script(
                kind,
                action,
                match status.code() {
                    Some(code) => format!("exit status {code}"),
                    None => "terminated by signal".to_string(),
                },
            ));
        }

        Ok(())
    }
}
