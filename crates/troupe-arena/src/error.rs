//! Arena-specific error types.

use std::fmt;

use thiserror::Error;
use troupe_core::NodeId;

/// Which lock primitive reported a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockKind {
    /// The tree-wide lock guarding the root and the node list.
    Tree,
    /// A node's structural (links) lock.
    Structural {
        /// Slot index of the node.
        index: u32,
    },
    /// A node's payload lock.
    Payload {
        /// Slot index of the node.
        index: u32,
    },
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tree => write!(f, "tree lock"),
            Self::Structural { index } => write!(f, "structural lock of slot {index}"),
            Self::Payload { index } => write!(f, "payload lock of slot {index}"),
        }
    }
}

/// Errors that can occur during arena operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// The slot index is outside the arena's current capacity.
    #[error("invalid id: index {index} is outside capacity {capacity}")]
    InvalidId {
        /// The rejected slot index.
        index: u32,
        /// Capacity at the time of the check.
        capacity: usize,
    },
    /// The slot is free, or was recycled since the id was issued.
    #[error("node {id} is not in use")]
    NotInUse {
        /// The id that no longer names a live actor.
        id: NodeId,
    },
    /// A join was requested on a node that is not benched.
    #[error("node {id} is already attached")]
    AlreadyAttached {
        /// The node that was expected to be benched.
        id: NodeId,
    },
    /// A lock was poisoned by a panicking holder.
    #[error("{lock} failed")]
    LockFailure {
        /// The lock that failed.
        lock: LockKind,
    },
    /// No free slot and the arena cannot grow any further.
    #[error("arena capacity exhausted at {capacity} slots")]
    CapacityExhausted {
        /// Capacity when the claim gave up.
        capacity: usize,
    },
    /// A structural operation named a parent that is not attached.
    #[error("parent {parent} is not attached")]
    ParentInvalid {
        /// The rejected parent.
        parent: NodeId,
    },
    /// The arena configuration is invalid.
    #[error("invalid arena config: {reason}")]
    InvalidConfig {
        /// Description of which invariant was violated.
        reason: String,
    },
}

impl ArenaError {
    pub(crate) fn tree_lock() -> Self {
        Self::LockFailure {
            lock: LockKind::Tree,
        }
    }

    pub(crate) fn structural_lock(index: u32) -> Self {
        Self::LockFailure {
            lock: LockKind::Structural { index },
        }
    }

    pub(crate) fn payload_lock(index: u32) -> Self {
        Self::LockFailure {
            lock: LockKind::Payload { index },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_lock() {
        let e = ArenaError::payload_lock(4);
        assert_eq!(e.to_string(), "payload lock of slot 4 failed");
        assert_eq!(ArenaError::tree_lock().to_string(), "tree lock failed");
    }

    #[test]
    fn display_includes_ids() {
        let e = ArenaError::NotInUse {
            id: NodeId::new(3, 2),
        };
        assert_eq!(e.to_string(), "node 3g2 is not in use");
        let e = ArenaError::InvalidId {
            index: 9,
            capacity: 8,
        };
        assert_eq!(e.to_string(), "invalid id: index 9 is outside capacity 8");
    }
}
