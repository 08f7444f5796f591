//! Core types and traits for the Troupe actor registry.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the arena and the engine: slot identifiers,
//! delivery tones, message envelopes, and the traits through which the
//! registry drives an actor's scripting engine.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod envelope;
pub mod error;
pub mod id;
pub mod tone;
pub mod traits;

pub use envelope::Envelope;
pub use error::{ScriptError, ToneError};
pub use id::{NodeId, ThreadTag};
pub use tone::Tone;
pub use traits::{Script, ScriptLoader};
