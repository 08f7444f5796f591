//! Benchmark profiles and utilities for the Troupe actor registry.
//!
//! Provides pre-built tree shapes and a counting script for the criterion
//! benches:
//!
//! - [`grow_balanced`]: a full tree of given fanout and depth
//! - [`Tally`] / [`TallyLoader`]: a script that only counts what it hears

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use troupe_arena::{ArenaConfig, ArenaError, Tree};
use troupe_core::{NodeId, Script, ScriptError, ScriptLoader, ThreadTag};

/// Number of nodes in a full tree with `fanout` children per node and
/// `depth` levels (the root is level 1).
pub fn balanced_size(fanout: usize, depth: usize) -> usize {
    (0..depth).map(|level| fanout.pow(level as u32)).sum()
}

/// Arena config sized to hold a full tree without growing.
pub fn balanced_config(fanout: usize, depth: usize) -> ArenaConfig {
    ArenaConfig::fixed(balanced_size(fanout, depth))
}

/// Grow a full tree level by level through `create(parent)`.
///
/// Returns every id in breadth-first order; the first is the root.
pub fn grow_balanced<E>(
    fanout: usize,
    depth: usize,
    mut create: impl FnMut(Option<NodeId>) -> Result<NodeId, E>,
) -> Result<Vec<NodeId>, E> {
    let mut ids = Vec::with_capacity(balanced_size(fanout, depth));
    if depth == 0 {
        return Ok(ids);
    }
    ids.push(create(None)?);
    let mut level = 0..1;
    for _ in 1..depth {
        let next_start = ids.len();
        for parent in level.clone() {
            let parent = ids[parent];
            for _ in 0..fanout {
                ids.push(create(Some(parent))?);
            }
        }
        level = next_start..ids.len();
    }
    Ok(ids)
}

/// A full tree of `u64` payloads, each payload its creation index.
pub fn balanced_tree(fanout: usize, depth: usize) -> Result<(Tree<u64>, Vec<NodeId>), ArenaError> {
    let tree = Tree::new(balanced_config(fanout, depth))?;
    let mut next = 0u64;
    let ids = grow_balanced(fanout, depth, |parent| {
        next += 1;
        tree.add_reference(next - 1, parent, ThreadTag(0))
    })?;
    Ok((tree, ids))
}

/// A script that counts the messages it hears into a shared counter.
pub struct Tally {
    heard: Arc<AtomicU64>,
}

impl Tally {
    /// A tally adding into `heard`.
    pub fn new(heard: &Arc<AtomicU64>) -> Self {
        Self {
            heard: Arc::clone(heard),
        }
    }
}

impl Script for Tally {
    fn on_message(&mut self, _message: &[u8], _author: NodeId) -> Result<(), ScriptError> {
        self.heard.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Loader producing [`Tally`] scripts that share one counter.
#[derive(Default)]
pub struct TallyLoader {
    heard: Arc<AtomicU64>,
}

impl TallyLoader {
    /// Messages heard by every script this loader has built.
    pub fn heard(&self) -> u64 {
        self.heard.load(Ordering::Relaxed)
    }

    /// Shared counter handed to each script.
    pub fn counter(&self) -> &Arc<AtomicU64> {
        &self.heard
    }
}

impl ScriptLoader for TallyLoader {
    type Script = Tally;

    fn load(&self, _source: &str) -> Result<Tally, ScriptError> {
        Ok(Tally::new(&self.heard))
    }
}
