//! Error types for the netlease system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

use crate::lease::SettingKind;
use crate::traits::ScriptAction;

/// Result type alias for netlease operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the netlease system
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed caller input; returned immediately, never retried
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The underlying lease negotiation could not start or was refused
    #[error("cannot configure device {device}: {reason}")]
    Negotiation {
        /// Device the caller addressed
        device: String,
        /// Underlying reason, suitable for the RPC boundary
        reason: String,
    },

    /// A backup/restore/install script returned failure; the same step is
    /// retried on the next reconciliation pass
    #[error("{action} script failed for {kind} settings: {message}")]
    Script {
        /// Setting kind being applied
        kind: SettingKind,
        /// Which script action failed
        action: ScriptAction,
        /// Error message
        message: String,
    },

    /// No artifact builder exists for a kind; fatal for that kind only
    #[error("cannot install new {0} settings - file format not understood")]
    UnsupportedKind(SettingKind),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O errors (script spawning, state files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a negotiation error for a device
    pub fn negotiation(device: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Negotiation {
            device: device.into(),
            reason: reason.into(),
        }
    }

    /// Create a script failure error
    pub fn script(kind: SettingKind, action: ScriptAction, message: impl Into<String>) -> Self {
        Self::Script {
            kind,
            action,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Machine-readable error domain for the RPC boundary
    ///
    /// Caller-visible failures carry this domain string plus the display
    /// message (which combines device name and underlying reason).
    pub fn domain(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "org.netlease.Error.InvalidArguments",
            Self::Negotiation { .. } => "org.netlease.Error.Failed",
            Self::Script { .. } => "org.netlease.Error.ScriptFailure",
            Self::UnsupportedKind(_) => "org.netlease.Error.UnsupportedKind",
            Self::Config(_) => "org.netlease.Error.Config",
            _ => "org.netlease.Error.General",
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
