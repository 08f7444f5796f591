//! Collaborator traits for the per-actor scripting engine.
//!
//! The registry treats an actor's behaviour as opaque: it owns the
//! [`Script`] value as a slot payload, calls its hooks when the actor is
//! loaded or a message reaches it, and only observes success or failure.

use crate::error::ScriptError;
use crate::id::NodeId;

/// Behaviour of one actor, owned by its arena slot once attached.
///
/// Hooks run while the actor's payload lock is held, so they must not call
/// back into structural operations on their own node (bench, join, delete).
/// Scripts that want to restructure the tree dispatch an action instead.
pub trait Script: Send + 'static {
    /// Handle a message delivered to this actor.
    fn on_message(&mut self, message: &[u8], author: NodeId) -> Result<(), ScriptError>;

    /// Run once after the actor has been attached under `id`.
    ///
    /// A failure causes the loader to delete the actor again.
    fn on_load(&mut self, id: NodeId) -> Result<(), ScriptError> {
        let _ = id;
        Ok(())
    }
}

impl<S: Script + ?Sized> Script for Box<S> {
    fn on_message(&mut self, message: &[u8], author: NodeId) -> Result<(), ScriptError> {
        (**self).on_message(message, author)
    }

    fn on_load(&mut self, id: NodeId) -> Result<(), ScriptError> {
        (**self).on_load(id)
    }
}

/// Turns script source text into an actor.
///
/// One loader is shared by every worker; each load produces an
/// independent [`Script`] value.
pub trait ScriptLoader: Send + Sync + 'static {
    /// The actor type produced by this loader.
    type Script: Script;

    /// Build an actor from `source`.
    fn load(&self, source: &str) -> Result<Self::Script, ScriptError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(usize);

    impl Script for Counter {
        fn on_message(&mut self, _message: &[u8], _author: NodeId) -> Result<(), ScriptError> {
            self.0 += 1;
            Ok(())
        }
    }

    #[test]
    fn boxed_script_forwards_hooks() {
        let mut boxed: Box<dyn Script> = Box::new(Counter(0));
        boxed.on_message(b"x", NodeId::new(0, 1)).unwrap();
        assert!(boxed.on_load(NodeId::new(1, 1)).is_ok());
    }
}
