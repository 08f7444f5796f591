//! The node arena: id-addressed slots organised as a parent/child tree.
//!
//! # Locking
//!
//! ```text
//! Tree
//! ├── shape: RwLock<Shape>            (tree lock: root + node list only)
//! │   └── nodes: Vec<Arc<Node<P>>>    (slots never move once allocated)
//! └── Node<P> × capacity
//!     ├── payload: Mutex<Option<P>>   (payload lock)
//!     └── links: RwLock<NodeLinks>    (structural lock)
//! ```
//!
//! Acquisition order is always payload → structural → tree. The tree lock
//! is only held long enough to clone a node's `Arc` or update the root, and
//! never while a node lock is being acquired. At most one node's
//! structural lock is held at a time: re-parenting updates the child,
//! releases it, and only then locks the parent.
//!
//! Subtree walks release each node before descending into the children
//! they snapshotted. A snapshotted child may be deleted or recycled before
//! it is visited; the walk detects this by generation and parent check and
//! skips it.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use smallvec::SmallVec;
use tracing::{debug, trace, warn};
use troupe_core::{NodeId, ThreadTag};

use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::links::{Lifecycle, NodeInfo, NodeLinks};
use crate::node::Node;

/// Children snapshot taken while a node is locked during a walk.
type ChildList = SmallVec<[NodeId; 8]>;

/// How far [`Tree::map_subtree`] descends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Depth {
    /// The start node and its direct children.
    Children,
    /// The start node and every transitive descendant.
    Recursive,
}

/// What [`Tree::unlink_reference`] does to the detached subtree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unlink {
    /// Keep payloads and internal links; hide the subtree from the tree.
    Bench,
    /// Release the subtree and hand its payloads back to the caller.
    Delete,
}

/// Payloads taken out of the arena by a delete, with the ids they had.
pub type Released<P> = Vec<(NodeId, P)>;

/// Per-state slot counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Total slots.
    pub capacity: usize,
    /// Slots never used or fully cleaned.
    pub unused: usize,
    /// Slots linked into the tree.
    pub attached: usize,
    /// Slots holding a benched actor.
    pub benched: usize,
    /// Released slots awaiting reuse.
    pub garbage: usize,
}

/// Outcome of [`Tree::tree_cleanup`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Payloads handed to the release function.
    pub released: usize,
    /// Slots skipped because their payload lock was held elsewhere.
    pub skipped: usize,
    /// Slots left untouched because one of their locks was poisoned.
    pub failed: usize,
}

struct Shape<P> {
    root: Option<NodeId>,
    nodes: Vec<Arc<Node<P>>>,
}

/// Concurrent, generational arena of actor slots arranged as a tree.
///
/// Every method takes `&self`; share the tree between threads with `Arc`.
pub struct Tree<P> {
    shape: RwLock<Shape<P>>,
    config: ArenaConfig,
}

// Compile-time assertion: a tree of sendable payloads is Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Tree<Box<dyn Send>>>();
};

impl<P> Tree<P> {
    /// Create an empty tree with `config.initial_capacity` unused slots.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        config.validate()?;
        let nodes = (0..config.initial_capacity)
            .map(|i| Arc::new(Node::new(i as u32)))
            .collect();
        Ok(Self {
            shape: RwLock::new(Shape { root: None, nodes }),
            config,
        })
    }

    /// The configuration this tree was built with.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    // ── Introspection ────────────────────────────────────────────

    /// Current number of slots. Never decreases.
    pub fn capacity(&self) -> Result<usize, ArenaError> {
        Ok(self.shape_read()?.nodes.len())
    }

    /// Whether `index` addresses a slot. Depends only on capacity, never
    /// on occupancy, so once true it stays true. A poisoned tree lock
    /// reads as invalid.
    pub fn is_valid_index(&self, index: u32) -> bool {
        self.capacity().is_ok_and(|capacity| (index as usize) < capacity)
    }

    /// The root, or `None` before the first add or after the root is
    /// deleted or benched.
    pub fn root(&self) -> Result<Option<NodeId>, ArenaError> {
        Ok(self.shape_read()?.root)
    }

    /// Whether `id` names a live (attached or benched) actor.
    pub fn contains(&self, id: NodeId) -> bool {
        self.with_links(id, |_| ()).is_ok()
    }

    /// Lifecycle state of the actor named by `id`.
    pub fn state(&self, id: NodeId) -> Result<Lifecycle, ArenaError> {
        self.with_links(id, |links| links.state())
    }

    /// Parent of `id`; `None` for the root.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, ArenaError> {
        self.with_links(id, |links| links.parent())
    }

    /// Children of `id` in insertion order.
    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>, ArenaError> {
        self.with_links(id, |links| links.children().collect())
    }

    /// Owning-thread affinity tag of `id`.
    pub fn thread(&self, id: NodeId) -> Result<ThreadTag, ArenaError> {
        self.with_links(id, |links| links.thread())
    }

    /// Run `f` over the links of `id` under its structural read lock.
    pub fn with_links<R>(
        &self,
        id: NodeId,
        f: impl FnOnce(&NodeLinks) -> R,
    ) -> Result<R, ArenaError> {
        let node = self.node_at(id.index())?;
        let links = node.read()?;
        links.check(id)?;
        Ok(f(&links))
    }

    /// Consistent snapshot of slot `index`, taken under its payload and
    /// structural locks.
    pub fn inspect(&self, index: u32) -> Result<NodeInfo, ArenaError> {
        let node = self.node_at(index)?;
        let payload = node.payload()?;
        let links = node.read()?;
        let info = NodeInfo {
            id: links.id(),
            state: links.state(),
            parent: links.parent(),
            children: links.children().collect(),
            thread: links.thread(),
            has_payload: payload.is_some(),
        };
        Ok(info)
    }

    /// Count slots per lifecycle state.
    pub fn occupancy(&self) -> Result<TreeStats, ArenaError> {
        let nodes = self.nodes_snapshot()?;
        let mut stats = TreeStats {
            capacity: nodes.len(),
            ..TreeStats::default()
        };
        for node in &nodes {
            match node.read()?.state() {
                Lifecycle::Unused => stats.unused += 1,
                Lifecycle::Attached => stats.attached += 1,
                Lifecycle::Benched => stats.benched += 1,
                Lifecycle::Garbage => stats.garbage += 1,
            }
        }
        Ok(stats)
    }

    // ── Payload access ───────────────────────────────────────────

    /// Run `f` on the payload of `id` while holding its payload lock.
    ///
    /// The closure is the borrow: the lock is released when it returns, so
    /// every acquisition has exactly one matching release. While `f` runs
    /// the actor cannot be deleted or recycled, but it may be benched.
    pub fn with_payload<R>(&self, id: NodeId, f: impl FnOnce(&mut P) -> R) -> Result<R, ArenaError> {
        let node = self.node_at(id.index())?;
        let mut payload = node.payload()?;
        node.read()?.check(id)?;
        let payload = payload.as_mut().ok_or(ArenaError::NotInUse { id })?;
        Ok(f(payload))
    }

    // ── Structural mutation ──────────────────────────────────────

    /// Claim a free slot for `payload` and link it under `parent`.
    ///
    /// With `parent == None` the node becomes the root if the tree has
    /// none, and is otherwise placed under the current root. If the parent
    /// is not attached the claim is rolled back and the payload dropped.
    pub fn add_reference(
        &self,
        payload: P,
        parent: Option<NodeId>,
        thread: ThreadTag,
    ) -> Result<NodeId, ArenaError> {
        if let Some(parent) = parent {
            if !self.is_valid_index(parent.index()) {
                return Err(ArenaError::ParentInvalid { parent });
            }
        }
        let id = self.claim(payload, thread)?;
        match self.attach(id, parent) {
            Ok(parent) => {
                debug!(node = %id, parent = ?parent, thread = %thread, "node attached");
                Ok(id)
            }
            Err(e) => {
                self.discard(id)?;
                debug!(node = %id, error = %e, "claim rolled back");
                Err(e)
            }
        }
    }

    /// Detach `id` from its parent and bench or delete its whole subtree.
    ///
    /// Benching keeps payloads and the subtree's internal links, so a later
    /// [`link_reference`](Self::link_reference) restores it in one step.
    /// Deleting releases every slot of the subtree and returns the payloads.
    /// Benching an already benched node is a no-op.
    pub fn unlink_reference(&self, id: NodeId, mode: Unlink) -> Result<Released<P>, ArenaError> {
        let node = self.node_at(id.index())?;
        let mut released = Vec::new();
        let (parent, children): (Option<NodeId>, ChildList) = match mode {
            Unlink::Bench => {
                let mut links = node.write()?;
                links.check(id)?;
                if links.state == Lifecycle::Benched {
                    return Ok(released);
                }
                links.state = Lifecycle::Benched;
                (links.parent, snapshot(&links))
            }
            Unlink::Delete => {
                let mut slot = node.lock()?;
                slot.links.check(id)?;
                let parent = slot.links.parent;
                let children = snapshot(&slot.links);
                slot.links.release();
                if let Some(payload) = slot.payload.take() {
                    released.push((id, payload));
                }
                (parent, children)
            }
        };
        drop(node);

        self.clear_root(id)?;
        if let Some(parent) = parent {
            self.disown(parent, id)?;
        }

        match mode {
            Unlink::Bench => self.bench_below(id, children)?,
            Unlink::Delete => self.walk_from(
                children.into_iter().map(|child| (child, Some(id))),
                Depth::Recursive,
                |node, child, from| {
                    let mut slot = node.lock()?;
                    if !slot.links.holds(child) || slot.links.parent != from {
                        return Ok(None);
                    }
                    let grandchildren = snapshot(&slot.links);
                    slot.links.release();
                    if let Some(payload) = slot.payload.take() {
                        released.push((child, payload));
                    }
                    Ok(Some(grandchildren))
                },
            )?,
        }

        debug!(node = %id, mode = ?mode, released = released.len(), "subtree unlinked");
        Ok(released)
    }

    /// Re-attach a benched node (and the subtree benched with it).
    ///
    /// With `parent == None` the node returns to the parent it was benched
    /// from; a benched root becomes the root again, or goes under the
    /// current root if another node has taken its place. On failure the
    /// node is left benched.
    pub fn link_reference(&self, id: NodeId, parent: Option<NodeId>) -> Result<(), ArenaError> {
        if parent == Some(id) {
            return Err(ArenaError::ParentInvalid { parent: id });
        }
        let node = self.node_at(id.index())?;
        let (previous, children): (Option<NodeId>, ChildList) = {
            let mut links = node.write()?;
            links.check(id)?;
            if links.state != Lifecycle::Benched {
                return Err(ArenaError::AlreadyAttached { id });
            }
            let previous = links.parent;
            links.state = Lifecycle::Attached;
            (previous, snapshot(&links))
        };

        let target = match self.attach(id, parent.or(previous)) {
            Ok(target) => target,
            Err(e) => {
                // Actors added under `id` while it was marked attached are
                // benched with it.
                let adopted = {
                    let mut links = node.write()?;
                    if !links.holds(id) {
                        return Err(e);
                    }
                    links.state = Lifecycle::Benched;
                    links.parent = previous;
                    snapshot(&links)
                };
                self.bench_below(id, adopted)?;
                debug!(node = %id, error = %e, "join rolled back");
                return Err(e);
            }
        };
        if let Some(previous) = previous {
            if target != Some(previous) {
                self.disown(previous, id)?;
            }
        }

        let start = children.into_iter().map(|child| (child, Some(id)));
        self.walk_from(start, Depth::Recursive, |node, child, from| {
            let mut links = node.write()?;
            if !links.holds(child) || links.parent != from {
                return Ok(None);
            }
            if links.state == Lifecycle::Benched {
                links.state = Lifecycle::Attached;
            }
            Ok(Some(snapshot(&links)))
        })?;

        debug!(node = %id, parent = ?target, "node joined");
        Ok(())
    }

    // ── Traversal ────────────────────────────────────────────────

    /// Visit `root` and its descendants in pre-order under structural read
    /// locks.
    ///
    /// Each node is locked only while `f` runs and its children are
    /// snapshotted. Benched members of a benched subtree are visited too;
    /// callbacks filter on [`NodeLinks::state`] as needed.
    pub fn map_subtree<F>(&self, root: NodeId, depth: Depth, mut f: F) -> Result<(), ArenaError>
    where
        F: FnMut(NodeId, &NodeLinks),
    {
        self.walk_from([(root, None)], depth, |node, id, from| {
            let links = node.read()?;
            if !links.holds(id) || (from.is_some() && links.parent != from) {
                return skip_or_missing(id, from);
            }
            f(id, &links);
            Ok(Some(snapshot(&links)))
        })
    }

    /// Like [`map_subtree`](Self::map_subtree), but each node is held under
    /// its payload and structural write locks and `f` may mutate the payload.
    pub fn map_subtree_mut<F>(&self, root: NodeId, depth: Depth, mut f: F) -> Result<(), ArenaError>
    where
        F: FnMut(NodeId, &NodeLinks, &mut P),
    {
        self.walk_from([(root, None)], depth, |node, id, from| {
            let mut slot = node.lock()?;
            if !slot.links.holds(id) || (from.is_some() && slot.links.parent != from) {
                return skip_or_missing(id, from);
            }
            let children = snapshot(&slot.links);
            if let Some(payload) = slot.payload.as_mut() {
                f(id, &slot.links, payload);
            }
            Ok(Some(children))
        })
    }

    // ── Cleanup ──────────────────────────────────────────────────

    /// Return a released slot to `Unused`, passing any payload still parked
    /// in it to `release`.
    ///
    /// Returns `Ok(false)` if the slot is live or was already recycled past
    /// `id`; cleanup only ever touches the occupant `id` named.
    pub fn node_cleanup(&self, id: NodeId, release: impl FnOnce(P)) -> Result<bool, ArenaError> {
        let node = self.node_at(id.index())?;
        let mut slot = node.lock()?;
        if slot.links.state != Lifecycle::Garbage || slot.links.generation != id.generation() {
            return Ok(false);
        }
        if let Some(payload) = slot.payload.take() {
            release(payload);
        }
        slot.links.reset();
        trace!(node = %id, "slot cleaned");
        Ok(true)
    }

    /// Release every payload and reset every slot, for shutdown.
    ///
    /// Slots whose payload lock is held elsewhere are skipped (their payload
    /// is leaked to the holder) rather than blocking shutdown. Slots with a
    /// poisoned lock are logged and counted as failed.
    pub fn tree_cleanup(&self, mut release: impl FnMut(NodeId, P)) -> Result<CleanupReport, ArenaError> {
        let mut report = CleanupReport::default();
        for node in self.nodes_snapshot()? {
            let mut slot = match node.try_lock() {
                Ok(Some(slot)) => slot,
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "tree cleanup hit a poisoned slot");
                    report.failed += 1;
                    continue;
                }
            };
            let id = slot.links.id();
            if let Some(payload) = slot.payload.take() {
                release(id, payload);
                report.released += 1;
            }
            slot.links.reset();
        }
        self.shape_write()?.root = None;
        if report.skipped > 0 {
            warn!(skipped = report.skipped, "tree cleanup left contended slots untouched");
        }
        debug!(released = report.released, "tree cleaned");
        Ok(report)
    }

    // ── Internals ────────────────────────────────────────────────

    fn shape_read(&self) -> Result<RwLockReadGuard<'_, Shape<P>>, ArenaError> {
        self.shape.read().map_err(|_| ArenaError::tree_lock())
    }

    fn shape_write(&self) -> Result<RwLockWriteGuard<'_, Shape<P>>, ArenaError> {
        self.shape.write().map_err(|_| ArenaError::tree_lock())
    }

    /// Clone the `Arc` of slot `index` under a brief tree read lock.
    fn node_at(&self, index: u32) -> Result<Arc<Node<P>>, ArenaError> {
        let shape = self.shape_read()?;
        shape
            .nodes
            .get(index as usize)
            .cloned()
            .ok_or(ArenaError::InvalidId {
                index,
                capacity: shape.nodes.len(),
            })
    }

    fn nodes_snapshot(&self) -> Result<Vec<Arc<Node<P>>>, ArenaError> {
        Ok(self.shape_read()?.nodes.clone())
    }

    /// Find the lowest free slot and take it for `payload`.
    ///
    /// The scan is optimistic: the winner re-checks under the slot's locks
    /// and rescans if another claimant got there first.
    fn claim(&self, payload: P, thread: ThreadTag) -> Result<NodeId, ArenaError> {
        let mut payload = Some(payload);
        loop {
            let nodes = self.nodes_snapshot()?;
            let mut candidate = None;
            for node in &nodes {
                if self.is_claimable(node)? {
                    candidate = Some(node);
                    break;
                }
            }
            let Some(node) = candidate else {
                self.grow(nodes.len())?;
                continue;
            };

            let mut slot = node.lock()?;
            if !slot.links.state.is_free() {
                continue;
            }
            *slot.payload = payload.take();
            return Ok(slot.links.claim(thread));
        }
    }

    /// Whether a slot looks free, cleaning it opportunistically if it was
    /// released but never reset.
    fn is_claimable(&self, node: &Node<P>) -> Result<bool, ArenaError> {
        let state = node.read()?.state();
        if state == Lifecycle::Garbage {
            if let Some(mut slot) = node.try_lock()? {
                if slot.links.state == Lifecycle::Garbage {
                    slot.payload.take();
                    slot.links.reset();
                }
            }
        }
        Ok(state.is_free())
    }

    /// Double the node list, up to `max_capacity`. A no-op if another
    /// thread already grew past `seen`.
    fn grow(&self, seen: usize) -> Result<(), ArenaError> {
        let mut shape = self.shape_write()?;
        let current = shape.nodes.len();
        if current > seen {
            return Ok(());
        }
        if current >= self.config.max_capacity {
            return Err(ArenaError::CapacityExhausted { capacity: current });
        }
        let target = current.saturating_mul(2).clamp(1, self.config.max_capacity);
        shape
            .nodes
            .extend((current..target).map(|i| Arc::new(Node::new(i as u32))));
        debug!(from = current, to = target, "arena grown");
        Ok(())
    }

    /// Link a freshly claimed or rejoining node under `parent`, or make it
    /// the root. Returns the parent it ended up under.
    ///
    /// An implicit parent is the current root. If that root is unlinked
    /// between lookup and adoption the attempt is retried against whatever
    /// the root is by then.
    fn attach(&self, id: NodeId, parent: Option<NodeId>) -> Result<Option<NodeId>, ArenaError> {
        if let Some(parent) = parent {
            self.set_parent(id, Some(parent))?;
            self.adopt(parent, id)?;
            return Ok(Some(parent));
        }
        loop {
            let root = {
                let mut shape = self.shape_write()?;
                match shape.root {
                    None => {
                        shape.root = Some(id);
                        None
                    }
                    Some(root) => Some(root),
                }
            };
            let Some(root) = root else {
                self.set_parent(id, None)?;
                return Ok(None);
            };
            self.set_parent(id, Some(root))?;
            match self.adopt(root, id) {
                Ok(()) => return Ok(Some(root)),
                Err(ArenaError::ParentInvalid { .. }) => std::thread::yield_now(),
                Err(e) => return Err(e),
            }
        }
    }

    /// Bench every attached descendant reachable through `children`, the
    /// child snapshot of the already benched `id`.
    fn bench_below(&self, id: NodeId, children: ChildList) -> Result<(), ArenaError> {
        let start = children.into_iter().map(|child| (child, Some(id)));
        self.walk_from(start, Depth::Recursive, |node, child, from| {
            let mut links = node.write()?;
            if !links.holds(child) || links.parent != from {
                return Ok(None);
            }
            if links.state == Lifecycle::Attached {
                links.state = Lifecycle::Benched;
            }
            Ok(Some(snapshot(&links)))
        })
    }

    fn set_parent(&self, id: NodeId, parent: Option<NodeId>) -> Result<(), ArenaError> {
        let node = self.node_at(id.index())?;
        let mut links = node.write()?;
        links.check(id)?;
        links.parent = parent;
        Ok(())
    }

    /// Add `child` to `parent`'s child set. The parent must be attached.
    fn adopt(&self, parent: NodeId, child: NodeId) -> Result<(), ArenaError> {
        let node = self
            .node_at(parent.index())
            .map_err(|_| ArenaError::ParentInvalid { parent })?;
        let mut links = node.write()?;
        if !links.holds(parent) || links.state != Lifecycle::Attached {
            return Err(ArenaError::ParentInvalid { parent });
        }
        links.children.insert(child);
        Ok(())
    }

    /// Remove `child` from `parent`'s child set, if `parent` still exists.
    fn disown(&self, parent: NodeId, child: NodeId) -> Result<(), ArenaError> {
        let Ok(node) = self.node_at(parent.index()) else {
            return Ok(());
        };
        let mut links = node.write()?;
        if links.holds(parent) {
            links.children.shift_remove(&child);
        }
        Ok(())
    }

    fn clear_root(&self, id: NodeId) -> Result<(), ArenaError> {
        let mut shape = self.shape_write()?;
        if shape.root == Some(id) {
            shape.root = None;
        }
        Ok(())
    }

    /// Undo a claim whose linking failed: drop the payload and release the
    /// slot.
    fn discard(&self, id: NodeId) -> Result<(), ArenaError> {
        let node = self.node_at(id.index())?;
        let mut slot = node.lock()?;
        if slot.links.holds(id) {
            slot.payload.take();
            slot.links.release();
        }
        drop(slot);
        self.clear_root(id)
    }

    /// Pre-order walk driver.
    ///
    /// `step` locks a node, decides whether it is still the node that was
    /// snapshotted (returning `Ok(None)` to skip it), does its work, and
    /// returns the children snapshot. Locks are dropped by `step` before
    /// the driver descends.
    fn walk_from<I, F>(&self, start: I, depth: Depth, mut step: F) -> Result<(), ArenaError>
    where
        I: IntoIterator<Item = (NodeId, Option<NodeId>)>,
        I::IntoIter: DoubleEndedIterator,
        F: FnMut(&Node<P>, NodeId, Option<NodeId>) -> Result<Option<ChildList>, ArenaError>,
    {
        let mut stack: Vec<(NodeId, Option<NodeId>, usize)> = start
            .into_iter()
            .rev()
            .map(|(id, from)| (id, from, 0))
            .collect();
        while let Some((id, from, level)) = stack.pop() {
            let node = match self.node_at(id.index()) {
                Ok(node) => node,
                Err(_) if from.is_some() => continue,
                Err(e) => return Err(e),
            };
            let Some(children) = step(&*node, id, from)? else {
                continue;
            };
            let descend = match depth {
                Depth::Recursive => true,
                Depth::Children => level == 0,
            };
            if descend {
                stack.extend(
                    children
                        .into_iter()
                        .rev()
                        .map(|child| (child, Some(id), level + 1)),
                );
            }
        }
        Ok(())
    }
}

fn snapshot(links: &NodeLinks) -> ChildList {
    links.children().collect()
}

/// A missing walk root is an error; a missing snapshotted child is not.
fn skip_or_missing(id: NodeId, from: Option<NodeId>) -> Result<Option<ChildList>, ArenaError> {
    match from {
        Some(_) => Ok(None),
        None => Err(ArenaError::NotInUse { id }),
    }
}
