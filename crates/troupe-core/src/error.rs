//! Error types shared across the Troupe workspace.
//!
//! Arena errors live in `troupe-arena`; this module holds the errors that
//! belong to the vocabulary itself: delivery tones and the scripting
//! collaborator.

use thiserror::Error;

/// Errors from naming or using a delivery [`Tone`](crate::Tone).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ToneError {
    /// The tone name is not one of `yell`, `command`, `say`, `whisper`, `think`.
    #[error("unknown tone '{name}'")]
    UnknownTone {
        /// The rejected name.
        name: String,
    },
    /// A whisper was requested without a recipient.
    #[error("whisper requires an explicit recipient")]
    MissingRecipient,
}

/// Failure reported by an actor's scripting engine.
///
/// The registry never interprets these; it only observes that a load or a
/// delivery failed and reports it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// The script source could not be turned into an actor.
    #[error("script load failed: {reason}")]
    Load {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// The script raised an error while handling a hook.
    #[error("script error: {reason}")]
    Runtime {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl ScriptError {
    /// Shorthand for a [`ScriptError::Runtime`].
    pub fn runtime(reason: impl Into<String>) -> Self {
        Self::Runtime {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`ScriptError::Load`].
    pub fn load(reason: impl Into<String>) -> Self {
        Self::Load {
            reason: reason.into(),
        }
    }
}
