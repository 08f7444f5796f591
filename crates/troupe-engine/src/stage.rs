//! User-facing [`Stage`] API and shutdown state machine.
//!
//! A stage assembles one actor tree, one delivery pool and one director:
//!
//! ```text
//! User Thread(s)                 Workers (N)               Delivery Agents (M)
//!     |                              |                            |
//!     |--create/bench/join/delete--> Company (direct, caller thread)
//!     |                              |                            |
//!     |--send()-----------------------------------try_send------> |
//!     |   [bounded(1) per agent, non-blocking]             resolve audience
//!     |                              |                     on_message × N
//!     |--load()/request()--> inbox.add()                          |
//!     |   [bounded per worker]   Load/Bench/Join/Delete           |
//!     |<--reply (bounded(1))---- Send -> outbox -> pump --post--> |
//! ```

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use troupe_arena::{CleanupReport, Released};
use troupe_core::{Envelope, NodeId, ScriptLoader, ThreadTag, Tone};

use crate::company::Company;
use crate::config::StageConfig;
use crate::director::Director;
use crate::error::{ConfigError, DispatchError, EngineError};
use crate::metrics::StageMetrics;
use crate::postman::{DeliveryPool, Posted};
use crate::tone::resolve_audience;
use crate::worker::{Action, ActionKind, ActionResult, Outcome, WorkerSetup, WorkerState};

/// Outcome of [`Stage::send`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sent {
    /// A delivery agent took the message.
    Accepted,
    /// Every delivery agent was busy; the message was dropped.
    Dropped,
}

// ── ShutdownReport ───────────────────────────────────────────────

/// Report from [`Stage::shutdown`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Total time spent in the shutdown sequence.
    pub total_ms: u64,
    /// Worker threads joined.
    pub workers_joined: usize,
    /// Outbox pump threads joined.
    pub pumps_joined: usize,
    /// Delivery agent threads joined.
    pub agents_joined: usize,
    /// Actors released at cleanup.
    pub released: usize,
    /// Actors whose payload lock was still held, or poisoned, at cleanup.
    pub leaked: usize,
}

// ── StageState ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageState {
    Running,
    Draining,
    Quiescing,
    Stopped,
}

// ── Stage ────────────────────────────────────────────────────────

/// A running actor registry.
///
/// Structural operations run on the calling thread; [`send`](Self::send)
/// hands messages to the delivery pool without blocking;
/// [`load`](Self::load) and [`request`](Self::request) go through the
/// worker pool.
pub struct Stage<L: ScriptLoader> {
    company: Company<L::Script>,
    pool: Arc<DeliveryPool<L::Script>>,
    director: Director,
    config: StageConfig,
    state: StageState,
}

impl<L: ScriptLoader> Stage<L> {
    /// Validate `config` and start the delivery agents and workers.
    pub fn new(config: StageConfig, loader: L) -> Result<Self, ConfigError> {
        config.validate()?;
        let company = Company::new(config.arena.clone())?;
        let pool = Arc::new(DeliveryPool::start(
            company.clone(),
            config.resolved_agent_count(),
        )?);
        let setup = WorkerSetup {
            company: company.clone(),
            loader: Arc::new(loader),
            pool: Arc::clone(&pool),
            inbox_capacity: config.inbox_capacity,
            outbox_idle: config.outbox_idle(),
        };
        let director = Director::start(&setup, config.resolved_worker_count(), config.seed)?;
        info!(
            workers = director.worker_count(),
            agents = pool.agent_count(),
            "stage running"
        );
        Ok(Self {
            company,
            pool,
            director,
            config,
            state: StageState::Running,
        })
    }

    fn running(&self) -> Result<(), EngineError> {
        match self.state {
            StageState::Running => Ok(()),
            _ => Err(EngineError::Shutdown),
        }
    }

    // ── Structure ────────────────────────────────────────────────

    /// Attach `script` under `parent` (the root if `None`) and run its
    /// load hook.
    pub fn create(
        &self,
        script: L::Script,
        parent: Option<NodeId>,
        thread: ThreadTag,
    ) -> Result<NodeId, EngineError> {
        self.running()?;
        self.company.create(script, parent, thread)
    }

    /// Detach an actor and its subtree, keeping their state.
    pub fn bench(&self, id: NodeId) -> Result<(), EngineError> {
        self.running()?;
        self.company.bench(id)
    }

    /// Re-attach a benched actor under `parent`, or where it was benched
    /// from.
    pub fn join(&self, id: NodeId, parent: Option<NodeId>) -> Result<(), EngineError> {
        self.running()?;
        self.company.join(id, parent)
    }

    /// Remove an actor and its subtree, handing their scripts back.
    pub fn delete(&self, id: NodeId) -> Result<Released<L::Script>, EngineError> {
        self.running()?;
        self.company.delete(id)
    }

    /// Parent of `id`; `None` for the root.
    pub fn node_parent(&self, id: NodeId) -> Result<Option<NodeId>, EngineError> {
        self.company.parent(id)
    }

    /// Owning-thread tag of `id`.
    pub fn node_thread(&self, id: NodeId) -> Result<ThreadTag, EngineError> {
        self.company.thread(id)
    }

    /// The root actor, if any.
    pub fn root(&self) -> Result<Option<NodeId>, EngineError> {
        self.company.root()
    }

    /// Shared handle on the actor tree.
    pub fn company(&self) -> &Company<L::Script> {
        &self.company
    }

    // ── Messaging ────────────────────────────────────────────────

    /// Hand a message to the delivery pool without blocking.
    ///
    /// `recipient` is required for [`Tone::Whisper`] and ignored otherwise.
    /// Returns [`Sent::Dropped`] if every delivery agent is busy.
    pub fn send(
        &self,
        sender: NodeId,
        tone: Tone,
        message: impl Into<Vec<u8>>,
        recipient: Option<NodeId>,
    ) -> Result<Sent, EngineError> {
        self.running()?;
        let envelope = Envelope::try_new(sender, tone, message, recipient)?;
        self.company.tree().state(sender)?;
        Ok(match self.pool.post_deliver(envelope) {
            Posted::Accepted(_) => Sent::Accepted,
            Posted::Dropped => Sent::Dropped,
        })
    }

    /// The actors a message from `sender` in `tone` would reach right now.
    pub fn audience(
        &self,
        sender: NodeId,
        tone: Tone,
        recipient: Option<NodeId>,
    ) -> Result<Vec<NodeId>, EngineError> {
        resolve_audience(self.company.tree(), sender, tone, recipient)
    }

    // ── Workers ──────────────────────────────────────────────────

    /// Offer an action to the worker pool without blocking.
    pub fn dispatch(&self, action: Action) -> Result<usize, DispatchError> {
        self.director.dispatch(action)
    }

    /// Run `kind` on a worker and wait for its outcome.
    pub fn request(&self, kind: ActionKind) -> ActionResult {
        self.running()?;
        let (action, reply) = Action::with_reply(kind);
        self.director.dispatch(action)?;
        reply.recv().map_err(|_| EngineError::Shutdown)?
    }

    /// Build an actor from `source` on a worker and attach it under
    /// `parent`. The actor's thread tag is the loading worker's index.
    pub fn load(&self, source: &str, parent: Option<NodeId>) -> Result<NodeId, EngineError> {
        match self.request(ActionKind::Load {
            source: source.to_owned(),
            parent,
        })? {
            Outcome::Loaded(id) => Ok(id),
            other => Err(EngineError::UnexpectedReply {
                reply: format!("{other:?}"),
            }),
        }
    }

    /// Current state of each worker.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.director.states()
    }

    // ── Introspection ────────────────────────────────────────────

    /// Delivery counters, arena occupancy and per-worker progress.
    pub fn metrics(&self) -> Result<StageMetrics, EngineError> {
        Ok(StageMetrics {
            delivery: self.pool.metrics(),
            tree: self.company.occupancy()?,
            processed: self.director.processed(),
            workers: self.director.states(),
        })
    }

    /// The configuration this stage was started with.
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Whether [`shutdown`](Self::shutdown) has completed.
    pub fn is_shut_down(&self) -> bool {
        self.state == StageState::Stopped
    }

    /// Shut the stage down.
    ///
    /// 1. **Running → Draining:** stop the director; workers drain their
    ///    inboxes, pumps drain their outboxes, all are joined.
    /// 2. **Draining → Quiescing:** stop the delivery pool; agents finish
    ///    the envelope they hold and are joined.
    /// 3. **Quiescing → Stopped:** release every remaining actor.
    ///
    /// Idempotent: later calls return an empty report.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.state == StageState::Stopped {
            return ShutdownReport::default();
        }
        let start = Instant::now();

        self.state = StageState::Draining;
        let stopped = self.director.stop();

        self.state = StageState::Quiescing;
        let agents_joined = self.pool.shutdown();

        let cleanup = self.company.release_all().unwrap_or_else(|e| {
            warn!(error = %e, "actor cleanup failed");
            CleanupReport::default()
        });
        if cleanup.skipped > 0 {
            warn!(leaked = cleanup.skipped, "actors still borrowed at shutdown");
        }
        if cleanup.failed > 0 {
            warn!(leaked = cleanup.failed, "actors behind poisoned locks at shutdown");
        }
        self.state = StageState::Stopped;

        let report = ShutdownReport {
            total_ms: start.elapsed().as_millis() as u64,
            workers_joined: stopped.workers_joined,
            pumps_joined: stopped.pumps_joined,
            agents_joined,
            released: cleanup.released,
            leaked: cleanup.skipped + cleanup.failed,
        };
        info!(
            released = report.released,
            total_ms = report.total_ms,
            "stage stopped"
        );
        report
    }
}

impl<L: ScriptLoader> Drop for Stage<L> {
    fn drop(&mut self) {
        if self.state != StageState::Stopped {
            self.shutdown();
        }
    }
}
