//! Troupe: a concurrent actor registry.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Troupe sub-crates. For most users, adding `troupe` as a single dependency is
//! sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//!
//! use troupe::prelude::*;
//!
//! // An actor that counts what it hears.
//! struct Ear(Arc<AtomicUsize>);
//! impl Script for Ear {
//!     fn on_message(&mut self, _message: &[u8], _author: NodeId) -> Result<(), ScriptError> {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         Ok(())
//!     }
//! }
//!
//! struct EarLoader(Arc<AtomicUsize>);
//! impl ScriptLoader for EarLoader {
//!     type Script = Ear;
//!     fn load(&self, _source: &str) -> Result<Ear, ScriptError> {
//!         Ok(Ear(Arc::clone(&self.0)))
//!     }
//! }
//!
//! let heard = Arc::new(AtomicUsize::new(0));
//! let mut stage = Stage::new(StageConfig::default(), EarLoader(Arc::clone(&heard))).unwrap();
//!
//! let director = stage.load("director", None).unwrap();
//! let lead = stage.load("lead", Some(director)).unwrap();
//! stage.load("understudy", Some(director)).unwrap();
//!
//! // The lead speaks to its parent and siblings.
//! assert_eq!(stage.audience(lead, Tone::Say, None).unwrap().len(), 2);
//! assert_eq!(stage.send(lead, Tone::Say, "places", None).unwrap(), Sent::Accepted);
//!
//! let deadline = Instant::now() + Duration::from_secs(5);
//! while heard.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
//!     std::thread::yield_now();
//! }
//! assert_eq!(heard.load(Ordering::SeqCst), 2);
//!
//! let report = stage.shutdown();
//! assert_eq!(report.released, 3);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `troupe-core` | Node ids, tones, envelopes, script traits |
//! | [`arena`] | `troupe-arena` | Generational node arena and tree operations |
//! | [`engine`] | `troupe-engine` | Delivery pool, workers, and the `Stage` |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and traits (`troupe-core`).
///
/// Contains [`types::NodeId`], [`types::Tone`], [`types::Envelope`] and the
/// [`types::Script`] / [`types::ScriptLoader`] traits.
pub use troupe_core as types;

/// Generational node arena (`troupe-arena`).
///
/// [`arena::Tree`] can be used on its own as a concurrent tree of any
/// payload type.
pub use troupe_arena as arena;

/// Message delivery and dispatch (`troupe-engine`).
///
/// [`engine::Stage`] is the usual entry point.
pub use troupe_engine as engine;

/// Common imports for typical Troupe usage.
///
/// ```rust
/// use troupe::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use troupe_core::{Envelope, NodeId, Script, ScriptLoader, ThreadTag, Tone};

    // Errors
    pub use troupe_arena::ArenaError;
    pub use troupe_core::{ScriptError, ToneError};
    pub use troupe_engine::{ConfigError, EngineError};

    // Arena
    pub use troupe_arena::{ArenaConfig, Lifecycle};

    // Engine
    pub use troupe_engine::{
        ActionKind, Outcome, Sent, ShutdownReport, Stage, StageConfig, StageMetrics,
    };
}
