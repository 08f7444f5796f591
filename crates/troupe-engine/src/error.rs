//! Error types for the delivery and dispatch layer.

use thiserror::Error;
use troupe_arena::ArenaError;
use troupe_core::{ScriptError, ToneError};

use crate::worker::Action;

/// Errors from [`Stage`](crate::stage::Stage) operations and the
/// components behind it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The arena rejected a structural operation or lookup.
    #[error(transparent)]
    Arena(#[from] ArenaError),
    /// A tone or envelope was malformed.
    #[error(transparent)]
    Tone(#[from] ToneError),
    /// The scripting engine failed to load or run an actor.
    #[error(transparent)]
    Script(#[from] ScriptError),
    /// The stage, or the worker serving a request, has shut down.
    #[error("stage has shut down")]
    Shutdown,
    /// Every worker inbox was full when an action was offered.
    #[error("every worker inbox is full")]
    Saturated,
    /// A worker answered a request with an outcome of the wrong kind.
    #[error("unexpected worker reply: {reply}")]
    UnexpectedReply {
        /// Debug rendering of the reply.
        reply: String,
    },
}

/// A rejected [`Director::dispatch`](crate::director::Director::dispatch).
///
/// The action is handed back so the caller can retry or drop it.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Every worker inbox was full.
    #[error("every worker inbox is full")]
    Saturated(Action),
    /// The director has been stopped.
    #[error("director has been stopped")]
    Shutdown(Action),
}

impl DispatchError {
    /// Recover the rejected action.
    pub fn into_action(self) -> Action {
        match self {
            Self::Saturated(action) | Self::Shutdown(action) => action,
        }
    }
}

impl From<DispatchError> for EngineError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Saturated(_) => Self::Saturated,
            DispatchError::Shutdown(_) => Self::Shutdown,
        }
    }
}

/// Errors detected while validating a
/// [`StageConfig`](crate::config::StageConfig) or starting a stage.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The arena configuration is invalid.
    #[error("invalid arena config: {0}")]
    Arena(#[from] ArenaError),
    /// Worker inboxes must hold at least one action.
    #[error("inbox_capacity must be at least 1")]
    InboxCapacityZero,
    /// The outbox pump must idle for a positive interval.
    #[error("outbox_idle_ms must be at least 1")]
    OutboxIdleZero,
    /// A background thread could not be spawned.
    #[error("failed to spawn {name}: {reason}")]
    ThreadSpawnFailed {
        /// Name of the thread that failed to start.
        name: String,
        /// OS error description.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::ActionKind;
    use troupe_core::NodeId;

    #[test]
    fn arena_errors_pass_through() {
        let id = NodeId::new(3, 1);
        let e: EngineError = ArenaError::NotInUse { id }.into();
        assert_eq!(e, EngineError::Arena(ArenaError::NotInUse { id }));
        assert_eq!(e.to_string(), ArenaError::NotInUse { id }.to_string());
    }

    #[test]
    fn dispatch_error_returns_action() {
        let id = NodeId::new(1, 1);
        let err = DispatchError::Saturated(Action::new(ActionKind::Bench(id)));
        assert_eq!(err.to_string(), "every worker inbox is full");
        assert!(matches!(err.into_action().kind(), ActionKind::Bench(b) if *b == id));
    }

    #[test]
    fn dispatch_error_converts_to_engine_error() {
        let err = DispatchError::Shutdown(Action::new(ActionKind::Delete(NodeId::new(0, 1))));
        assert_eq!(EngineError::from(err), EngineError::Shutdown);
    }
}
