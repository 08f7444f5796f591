//! Message delivery, action dispatch and the [`Stage`] for Troupe.
//!
//! A [`Stage`] owns one actor tree ([`Company`]), a pool of delivery
//! agents ([`DeliveryPool`]) and a pool of workers behind a [`Director`].
//! Structural operations run on the caller's thread; messages are handed
//! to delivery agents without blocking; script loading and queued
//! structural work run on the workers.
//!
//! # Threads
//!
//! ```text
//! troupe-worker-{i}   runs Actions from its bounded inbox
//! troupe-pump-{i}     drains worker i's outbox into the delivery pool
//! troupe-postman-{j}  resolves audiences and calls on_message
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod company;
pub mod config;
pub mod director;
pub mod error;
pub mod mailbox;
pub mod metrics;
pub mod postman;
pub mod stage;
pub mod tone;
pub mod worker;

pub use company::Company;
pub use config::StageConfig;
pub use director::{Director, StopReport};
pub use error::{ConfigError, DispatchError, EngineError};
pub use mailbox::{Drained, Mailbox, MailboxError};
pub use metrics::{DeliveryMetrics, DeliveryStats, StageMetrics};
pub use postman::{DeliveryPool, DeliveryReport, Posted};
pub use stage::{Sent, ShutdownReport, Stage};
pub use tone::resolve_audience;
pub use worker::{Action, ActionKind, ActionResult, Outcome, WorkerState};
