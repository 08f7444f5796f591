//! The actor registry: a tree of scripts.
//!
//! [`Company`] is a cloneable handle on one shared [`Tree`] whose payloads
//! are [`Script`]s. It adds the actor-level rules on top of the arena:
//! a new actor's load hook runs before creation is reported, and an actor
//! whose hook fails is removed again.

use std::sync::Arc;

use tracing::{debug, warn};
use troupe_arena::{
    ArenaConfig, ArenaError, CleanupReport, Lifecycle, Released, Tree, TreeStats, Unlink,
};
use troupe_core::{NodeId, Script, ThreadTag};

use crate::error::EngineError;

/// Shared handle on the actor tree.
pub struct Company<S> {
    tree: Arc<Tree<S>>,
}

impl<S> Clone for Company<S> {
    fn clone(&self) -> Self {
        Self {
            tree: Arc::clone(&self.tree),
        }
    }
}

impl<S: Script> Company<S> {
    /// Create an empty company.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        Ok(Self {
            tree: Arc::new(Tree::new(config)?),
        })
    }

    /// The underlying arena.
    pub fn tree(&self) -> &Tree<S> {
        &self.tree
    }

    /// Attach `script` under `parent` (or at the root) and run its load
    /// hook.
    ///
    /// If the hook fails the actor is deleted again and the script error
    /// is returned.
    pub fn create(
        &self,
        script: S,
        parent: Option<NodeId>,
        thread: ThreadTag,
    ) -> Result<NodeId, EngineError> {
        let id = self.tree.add_reference(script, parent, thread)?;
        match self.tree.with_payload(id, |script| script.on_load(id))? {
            Ok(()) => Ok(id),
            Err(e) => {
                warn!(node = %id, error = %e, "load hook failed; removing actor");
                self.tree.unlink_reference(id, Unlink::Delete)?;
                Err(e.into())
            }
        }
    }

    /// Detach `id` and its subtree, keeping their state for a later
    /// [`join`](Self::join).
    pub fn bench(&self, id: NodeId) -> Result<(), EngineError> {
        self.tree.unlink_reference(id, Unlink::Bench)?;
        Ok(())
    }

    /// Re-attach a benched actor under `parent`, or where it was benched
    /// from.
    pub fn join(&self, id: NodeId, parent: Option<NodeId>) -> Result<(), EngineError> {
        self.tree.link_reference(id, parent)?;
        Ok(())
    }

    /// Remove `id` and its subtree, handing their scripts back.
    pub fn delete(&self, id: NodeId) -> Result<Released<S>, EngineError> {
        let released = self.tree.unlink_reference(id, Unlink::Delete)?;
        debug!(node = %id, actors = released.len(), "actors deleted");
        Ok(released)
    }

    /// Run `f` on the script of `id` under its payload lock.
    pub fn with_actor<R>(&self, id: NodeId, f: impl FnOnce(&mut S) -> R) -> Result<R, EngineError> {
        Ok(self.tree.with_payload(id, f)?)
    }

    /// Whether `id` names a live actor, benched or not.
    pub fn contains(&self, id: NodeId) -> bool {
        self.tree.contains(id)
    }

    /// Whether `id` names an attached actor.
    pub fn is_attached(&self, id: NodeId) -> bool {
        matches!(self.tree.state(id), Ok(Lifecycle::Attached))
    }

    /// Parent of `id`; `None` for the root.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, EngineError> {
        Ok(self.tree.parent(id)?)
    }

    /// Owning-thread tag of `id`.
    pub fn thread(&self, id: NodeId) -> Result<ThreadTag, EngineError> {
        Ok(self.tree.thread(id)?)
    }

    /// The root actor, if any.
    pub fn root(&self) -> Result<Option<NodeId>, EngineError> {
        Ok(self.tree.root()?)
    }

    /// Slot counts per lifecycle state.
    pub fn occupancy(&self) -> Result<TreeStats, EngineError> {
        Ok(self.tree.occupancy()?)
    }

    /// Drop every remaining script. Scripts whose payload lock is still
    /// held are left to their holder and counted as skipped.
    pub fn release_all(&self) -> Result<CleanupReport, EngineError> {
        Ok(self.tree.tree_cleanup(|id, script| {
            debug!(node = %id, "releasing actor");
            drop(script);
        })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troupe_core::ScriptError;

    struct Extra {
        fail_load: bool,
        heard: Vec<Vec<u8>>,
    }

    impl Extra {
        fn ok() -> Self {
            Self {
                fail_load: false,
                heard: Vec::new(),
            }
        }
    }

    impl Script for Extra {
        fn on_message(&mut self, message: &[u8], _author: NodeId) -> Result<(), ScriptError> {
            self.heard.push(message.to_vec());
            Ok(())
        }

        fn on_load(&mut self, _id: NodeId) -> Result<(), ScriptError> {
            if self.fail_load {
                Err(ScriptError::runtime("refused"))
            } else {
                Ok(())
            }
        }
    }

    fn company() -> Company<Extra> {
        Company::new(ArenaConfig::new(4)).unwrap()
    }

    #[test]
    fn create_runs_load_hook() {
        let company = company();
        let root = company.create(Extra::ok(), None, ThreadTag(3)).unwrap();
        assert_eq!(company.root().unwrap(), Some(root));
        assert_eq!(company.thread(root).unwrap(), ThreadTag(3));
        assert!(company.is_attached(root));
    }

    #[test]
    fn failed_load_hook_removes_actor() {
        let company = company();
        let root = company.create(Extra::ok(), None, ThreadTag(0)).unwrap();
        let err = company
            .create(
                Extra {
                    fail_load: true,
                    heard: Vec::new(),
                },
                Some(root),
                ThreadTag(0),
            )
            .unwrap_err();
        assert_eq!(err, EngineError::Script(ScriptError::runtime("refused")));
        assert_eq!(company.occupancy().unwrap().attached, 1);
        assert!(company.tree().children(root).unwrap().is_empty());
    }

    #[test]
    fn delete_hands_scripts_back() {
        let company = company();
        let root = company.create(Extra::ok(), None, ThreadTag(0)).unwrap();
        let child = company.create(Extra::ok(), Some(root), ThreadTag(0)).unwrap();
        company
            .with_actor(child, |p| p.on_message(b"hi", root))
            .unwrap()
            .unwrap();
        let released = company.delete(root).unwrap();
        assert_eq!(released.len(), 2);
        assert_eq!(released[1].1.heard, vec![b"hi".to_vec()]);
        assert_eq!(
            company.parent(child),
            Err(EngineError::Arena(ArenaError::NotInUse { id: child }))
        );
    }

    #[test]
    fn bench_and_join_through_company() {
        let company = company();
        let root = company.create(Extra::ok(), None, ThreadTag(0)).unwrap();
        let child = company.create(Extra::ok(), Some(root), ThreadTag(0)).unwrap();
        company.bench(child).unwrap();
        assert!(company.contains(child));
        assert!(!company.is_attached(child));
        company.join(child, None).unwrap();
        assert!(company.is_attached(child));
        assert_eq!(company.release_all().unwrap().released, 2);
    }
}
