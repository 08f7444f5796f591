//! Generational node arena for the Troupe actor tree.
//!
//! Every actor lives in a numbered slot. Slots are linked into a single
//! tree through parent and child ids, and each slot carries two locks so
//! that structural changes and payload access on different nodes proceed
//! in parallel.
//!
//! # Architecture
//!
//! ```text
//! Tree<P>
//! ├── RwLock<Shape>          (root id + slot list; growth and root changes)
//! └── Node<P> × capacity
//!     ├── Mutex<Option<P>>   (payload lock, taken first)
//!     └── RwLock<NodeLinks>  (structural lock: state, generation, links)
//! ```
//!
//! # Identifiers
//!
//! A [`NodeId`](troupe_core::NodeId) pairs a slot index with the claim
//! generation of its occupant. Recycling a slot bumps the generation, so
//! an id kept past a delete is rejected with
//! [`ArenaError::NotInUse`] instead of reaching the new occupant.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod links;
mod node;
pub mod tree;

// Public re-exports for the primary API surface.
pub use config::ArenaConfig;
pub use error::{ArenaError, LockKind};
pub use links::{Lifecycle, NodeInfo, NodeLinks};
pub use tree::{CleanupReport, Depth, Released, Tree, TreeStats, Unlink};
