//! Strongly-typed identifiers for arena slots and owning threads.

use std::fmt;

/// Identifies one actor slot in the arena.
///
/// `index` addresses the slot and stays syntactically valid for the
/// lifetime of the arena (capacity never shrinks). `generation` is bumped
/// every time the slot is claimed, so an id naming a slot that has since
/// been released and recycled is detected instead of silently aliasing
/// the new occupant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Create an id from its raw parts.
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index within the arena.
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Claim generation of the slot when this id was issued.
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Slot index as a `usize`, for indexing the node list.
    pub const fn slot(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}g{}", self.index, self.generation)
    }
}

/// Owning-thread affinity tag of an actor.
///
/// Actors loaded through the director carry the index of the worker that
/// loaded them; actors created directly carry whatever tag the caller chose.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadTag(pub u32);

impl fmt::Display for ThreadTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ThreadTag {
    fn from(v: u32) -> Self {
        Self(v)
    }
}
