//! One arena slot and its two locks.
//!
//! A [`Node`] pairs a structural `RwLock<NodeLinks>` with a payload
//! `Mutex<Option<P>>`. Whenever both are needed they are taken payload
//! first, then structural. The only way to hold both at once is a
//! [`SlotGuard`], whose constructors acquire them in that order, so the
//! reverse order cannot be written by accident.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use crate::error::ArenaError;
use crate::links::NodeLinks;

pub(crate) struct Node<P> {
    index: u32,
    links: RwLock<NodeLinks>,
    payload: Mutex<Option<P>>,
}

// Compile-time assertion: nodes of a sendable payload are shareable.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Node<Box<dyn Send>>>();
};

/// Payload lock and structural write lock of one node, held together.
///
/// `links` is declared first so it is released first, mirroring the
/// acquisition order.
pub(crate) struct SlotGuard<'a, P> {
    pub(crate) links: RwLockWriteGuard<'a, NodeLinks>,
    pub(crate) payload: MutexGuard<'a, Option<P>>,
}

impl<P> Node<P> {
    pub(crate) fn new(index: u32) -> Self {
        Self {
            index,
            links: RwLock::new(NodeLinks::new(index)),
            payload: Mutex::new(None),
        }
    }

    /// Structural read lock.
    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, NodeLinks>, ArenaError> {
        self.links
            .read()
            .map_err(|_| ArenaError::structural_lock(self.index))
    }

    /// Structural write lock, without the payload.
    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, NodeLinks>, ArenaError> {
        self.links
            .write()
            .map_err(|_| ArenaError::structural_lock(self.index))
    }

    /// Payload lock alone. Callers may take [`read`](Self::read) after
    /// this, never before.
    pub(crate) fn payload(&self) -> Result<MutexGuard<'_, Option<P>>, ArenaError> {
        self.payload
            .lock()
            .map_err(|_| ArenaError::payload_lock(self.index))
    }

    /// Payload lock, then structural write lock.
    pub(crate) fn lock(&self) -> Result<SlotGuard<'_, P>, ArenaError> {
        let payload = self.payload()?;
        let links = self.write()?;
        Ok(SlotGuard { links, payload })
    }

    /// Like [`lock`](Self::lock), but gives up immediately if either lock
    /// is held elsewhere. Returns `Ok(None)` when contended.
    pub(crate) fn try_lock(&self) -> Result<Option<SlotGuard<'_, P>>, ArenaError> {
        let payload = match self.payload.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Ok(None),
            Err(TryLockError::Poisoned(_)) => return Err(ArenaError::payload_lock(self.index)),
        };
        let links = match self.links.try_write() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Ok(None),
            Err(TryLockError::Poisoned(_)) => {
                return Err(ArenaError::structural_lock(self.index))
            }
        };
        Ok(Some(SlotGuard { links, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::Lifecycle;
    use std::sync::Arc;
    use std::thread;
    use troupe_core::ThreadTag;

    #[test]
    fn slot_guard_sees_both_halves() {
        let node: Node<String> = Node::new(3);
        {
            let mut slot = node.lock().unwrap();
            slot.links.claim(ThreadTag(1));
            *slot.payload = Some("actor".into());
        }
        assert_eq!(node.read().unwrap().state(), Lifecycle::Attached);
        assert_eq!(node.payload().unwrap().as_deref(), Some("actor"));
    }

    #[test]
    fn try_lock_reports_contention() {
        let node: Node<u32> = Node::new(0);
        let held = node.payload().unwrap();
        assert!(node.try_lock().unwrap().is_none());
        drop(held);
        assert!(node.try_lock().unwrap().is_some());
    }

    #[test]
    fn poisoned_payload_lock_is_a_lock_failure() {
        let node: Arc<Node<u32>> = Arc::new(Node::new(7));
        let n = Arc::clone(&node);
        let _ = thread::spawn(move || {
            let _guard = n.payload().unwrap();
            panic!("poison the payload lock");
        })
        .join();
        assert_eq!(node.payload().err(), Some(ArenaError::payload_lock(7)));
        assert!(node.lock().is_err());
    }
}
