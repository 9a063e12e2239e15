//! Core trait seams
//!
//! External collaborators are consumed through these traits:
//! - [`ScriptExecutor`]: runs one backup/restore/install script
//! - [`Negotiator`]: drives the wire-level lease negotiation

pub mod negotiator;
pub mod script;

pub use negotiator::{NegotiationOutcome, Negotiator, Outcome};
pub use script::{ScriptAction, ScriptExecutor};
