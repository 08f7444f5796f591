//! Lifecycle states and the structural half of a node.
//!
//! [`NodeLinks`] is everything a node's structural lock protects: lifecycle
//! state, claim generation, parent, ordered children and thread tag. The
//! payload lives beside it under its own lock.

use indexmap::IndexSet;
use troupe_core::{NodeId, ThreadTag};

use crate::error::ArenaError;

/// Lifecycle state of an arena slot.
///
/// ```text
/// Unused ──claim──▶ Attached ◀──join/bench──▶ Benched
///                      │                         │
///                      └─────────delete──────────┴──▶ Garbage ──cleanup──▶ Unused
/// ```
///
/// `Unused` and `Garbage` are both free slots. `Garbage` records that the
/// slot was used and released, so a reader holding an old id sees a
/// well-defined "not in use" answer until the slot is claimed again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Never allocated, or fully cleaned.
    Unused,
    /// Linked into the tree; receives and produces messages.
    Attached,
    /// Owns a payload but is detached from the tree and invisible to
    /// traversal from the root.
    Benched,
    /// Released; eligible for reuse.
    Garbage,
}

impl Lifecycle {
    /// Whether a claim may take this slot.
    pub fn is_free(self) -> bool {
        matches!(self, Self::Unused | Self::Garbage)
    }

    /// Whether the slot currently owns a payload.
    pub fn in_use(self) -> bool {
        matches!(self, Self::Attached | Self::Benched)
    }
}

/// Structural state of one node: everything guarded by its structural lock.
#[derive(Debug)]
pub struct NodeLinks {
    index: u32,
    pub(crate) state: Lifecycle,
    pub(crate) generation: u32,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: IndexSet<NodeId>,
    pub(crate) thread: ThreadTag,
}

impl NodeLinks {
    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            state: Lifecycle::Unused,
            generation: 0,
            parent: None,
            children: IndexSet::new(),
            thread: ThreadTag::default(),
        }
    }

    /// The id of the current (or most recent) occupant.
    pub fn id(&self) -> NodeId {
        NodeId::new(self.index, self.generation)
    }

    /// Lifecycle state.
    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Parent id. Benched nodes keep the parent they were benched from so
    /// that a join without an explicit parent can return them there.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child ids in insertion order.
    pub fn children(&self) -> impl ExactSizeIterator<Item = NodeId> + '_ {
        self.children.iter().copied()
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Owning-thread affinity tag.
    pub fn thread(&self) -> ThreadTag {
        self.thread
    }

    /// Whether `id` names the live occupant of this slot.
    pub fn holds(&self, id: NodeId) -> bool {
        self.state.in_use() && self.generation == id.generation()
    }

    /// [`holds`](Self::holds), as a `Result`.
    pub(crate) fn check(&self, id: NodeId) -> Result<(), ArenaError> {
        if self.holds(id) {
            Ok(())
        } else {
            Err(ArenaError::NotInUse { id })
        }
    }

    /// Take the slot for a new occupant: next generation, attached, no links.
    pub(crate) fn claim(&mut self, thread: ThreadTag) -> NodeId {
        self.generation = self.generation.wrapping_add(1);
        self.state = Lifecycle::Attached;
        self.parent = None;
        self.children.clear();
        self.thread = thread;
        self.id()
    }

    /// Drop all links and mark the slot released.
    pub(crate) fn release(&mut self) {
        self.state = Lifecycle::Garbage;
        self.parent = None;
        self.children.clear();
    }

    /// Return a released slot to its pristine state. The generation is kept
    /// so the next claim still produces a fresh id.
    pub(crate) fn reset(&mut self) {
        self.state = Lifecycle::Unused;
        self.parent = None;
        self.children.clear();
        self.thread = ThreadTag::default();
    }
}

/// Consistent snapshot of one slot, taken under both of its locks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    /// Id of the current or most recent occupant.
    pub id: NodeId,
    /// Lifecycle state.
    pub state: Lifecycle,
    /// Parent (remembered parent for benched nodes).
    pub parent: Option<NodeId>,
    /// Children in insertion order.
    pub children: Vec<NodeId>,
    /// Owning-thread affinity tag.
    pub thread: ThreadTag,
    /// Whether the slot owns a payload.
    pub has_payload: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_bumps_generation_and_clears_links() {
        let mut links = NodeLinks::new(5);
        links.children.insert(NodeId::new(1, 1));
        let first = links.claim(ThreadTag(2));
        assert_eq!(first, NodeId::new(5, 1));
        assert_eq!(links.state(), Lifecycle::Attached);
        assert_eq!(links.child_count(), 0);
        assert_eq!(links.thread(), ThreadTag(2));

        links.release();
        links.reset();
        let second = links.claim(ThreadTag(0));
        assert_eq!(second, NodeId::new(5, 2));
        assert!(!links.holds(first));
        assert!(links.holds(second));
    }

    #[test]
    fn garbage_slot_holds_nothing() {
        let mut links = NodeLinks::new(0);
        let id = links.claim(ThreadTag(0));
        links.release();
        assert_eq!(links.state(), Lifecycle::Garbage);
        assert_eq!(links.check(id), Err(ArenaError::NotInUse { id }));
    }

    #[test]
    fn lifecycle_predicates() {
        assert!(Lifecycle::Unused.is_free());
        assert!(Lifecycle::Garbage.is_free());
        assert!(Lifecycle::Attached.in_use());
        assert!(Lifecycle::Benched.in_use());
        assert!(!Lifecycle::Benched.is_free());
    }
}
