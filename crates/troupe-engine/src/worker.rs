//! Worker threads and the actions they run.
//!
//! Each worker owns a bounded action inbox, a private outbound envelope
//! mailbox, and a pump thread that drains that mailbox into the delivery
//! pool. The worker loop drains every queued action, then parks on the
//! inbox until more arrive or the inbox is closed.
//!
//! ```text
//! Director ──try add──▶ inbox ──▶ Worker i ──Send──▶ outbox ──▶ pump i ──post──▶ DeliveryPool
//!                                    │
//!                                    ├── Deliver ──▶ deliver inline
//!                                    └── Load / Bench / Join / Delete ──▶ Company
//! ```

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};
use troupe_core::{Envelope, NodeId, Script, ScriptLoader, ThreadTag};

use crate::company::Company;
use crate::error::{ConfigError, EngineError};
use crate::mailbox::Mailbox;
use crate::postman::{DeliveryPool, DeliveryReport};

// ── Actions ──────────────────────────────────────────────────────

/// The work a worker can be asked to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionKind {
    /// Queue an envelope on the worker's outbox for asynchronous delivery.
    Send(Envelope),
    /// Resolve and deliver an envelope on the worker thread.
    Deliver(Envelope),
    /// Build an actor from source and attach it under `parent`.
    Load {
        /// Script source handed to the loader.
        source: String,
        /// Parent actor; `None` attaches at (or as) the root.
        parent: Option<NodeId>,
    },
    /// Bench an actor and its subtree.
    Bench(NodeId),
    /// Re-attach a benched actor.
    Join {
        /// The benched actor.
        id: NodeId,
        /// New parent; `None` returns it to where it was benched from.
        parent: Option<NodeId>,
    },
    /// Delete an actor and its subtree.
    Delete(NodeId),
}

/// Successful result of an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The envelope was queued on the outbox.
    Queued,
    /// The envelope was delivered inline.
    Delivered(DeliveryReport),
    /// A new actor was attached with this id.
    Loaded(NodeId),
    /// The actor was benched.
    Benched,
    /// The actor was re-attached.
    Joined,
    /// This many actors were deleted.
    Deleted(usize),
}

/// What a worker sends back on an action's reply channel.
pub type ActionResult = Result<Outcome, EngineError>;

/// An [`ActionKind`] plus an optional reply channel.
#[derive(Debug)]
pub struct Action {
    kind: ActionKind,
    reply: Option<Sender<ActionResult>>,
}

impl Action {
    /// A fire-and-forget action. Failures are logged by the worker.
    pub fn new(kind: ActionKind) -> Self {
        Self { kind, reply: None }
    }

    /// An action whose outcome is sent back on the returned receiver.
    pub fn with_reply(kind: ActionKind) -> (Self, Receiver<ActionResult>) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (
            Self {
                kind,
                reply: Some(tx),
            },
            rx,
        )
    }

    /// What this action does.
    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }
}

// ── WorkerState ──────────────────────────────────────────────────

/// Lifecycle of a worker thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Running an action.
    Working = 0,
    /// Inbox empty; blocked waiting for the next action.
    Waiting = 1,
    /// Inbox closed and drained; the thread has exited or is exiting.
    Done = 2,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Working,
            1 => Self::Waiting,
            _ => Self::Done,
        }
    }
}

// ── Spawning ─────────────────────────────────────────────────────

/// Everything a worker needs, shared by every worker of one director.
pub(crate) struct WorkerSetup<L: ScriptLoader> {
    pub company: Company<L::Script>,
    pub loader: Arc<L>,
    pub pool: Arc<DeliveryPool<L::Script>>,
    pub inbox_capacity: usize,
    pub outbox_idle: Duration,
}

/// Director-side handle on one worker.
pub(crate) struct WorkerHandle {
    inbox: Arc<Mailbox<Action>>,
    state: Arc<AtomicU8>,
    processed: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn worker `index` and its outbox pump.
    pub(crate) fn spawn<L: ScriptLoader>(
        index: usize,
        setup: &WorkerSetup<L>,
    ) -> Result<Self, ConfigError> {
        let inbox = Arc::new(Mailbox::bounded(setup.inbox_capacity));
        let outbox = Arc::new(Mailbox::unbounded());
        let state = Arc::new(AtomicU8::new(WorkerState::Waiting as u8));
        let processed = Arc::new(AtomicU64::new(0));

        let pump_name = format!("troupe-pump-{index}");
        let pump = {
            let outbox = Arc::clone(&outbox);
            let pool = Arc::clone(&setup.pool);
            let idle = setup.outbox_idle;
            thread::Builder::new()
                .name(pump_name.clone())
                .spawn(move || pump_loop(&outbox, &pool, idle))
                .map_err(|e| ConfigError::ThreadSpawnFailed {
                    name: pump_name,
                    reason: e.to_string(),
                })?
        };

        let worker = Worker {
            index,
            inbox: Arc::clone(&inbox),
            outbox: Arc::clone(&outbox),
            company: setup.company.clone(),
            loader: Arc::clone(&setup.loader),
            pool: Arc::clone(&setup.pool),
            state: Arc::clone(&state),
            processed: Arc::clone(&processed),
        };
        let name = format!("troupe-worker-{index}");
        let thread = match thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                outbox.close();
                let _ = pump.join();
                return Err(ConfigError::ThreadSpawnFailed {
                    name,
                    reason: e.to_string(),
                });
            }
        };

        Ok(Self {
            inbox,
            state,
            processed,
            thread: Some(thread),
            pump: Some(pump),
        })
    }

    pub(crate) fn inbox(&self) -> &Mailbox<Action> {
        &self.inbox
    }

    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Close the inbox; the worker drains what is queued and exits.
    pub(crate) fn close(&self) {
        self.inbox.close();
    }

    /// Join the worker and then its pump. Returns `(worker, pump)` join
    /// success; a thread already joined counts as not joined.
    pub(crate) fn join(&mut self) -> (bool, bool) {
        let worker = self.thread.take().is_some_and(|h| h.join().is_ok());
        let pump = self.pump.take().is_some_and(|h| h.join().is_ok());
        (worker, pump)
    }
}

// ── Worker loop ──────────────────────────────────────────────────

struct Worker<L: ScriptLoader> {
    index: usize,
    inbox: Arc<Mailbox<Action>>,
    outbox: Arc<Mailbox<Envelope>>,
    company: Company<L::Script>,
    loader: Arc<L>,
    pool: Arc<DeliveryPool<L::Script>>,
    state: Arc<AtomicU8>,
    processed: Arc<AtomicU64>,
}

impl<L: ScriptLoader> Worker<L> {
    fn run(self) {
        debug!(worker = self.index, "worker started");
        loop {
            let action = match self.inbox.next() {
                Some(action) => action,
                None => {
                    self.set_state(WorkerState::Waiting);
                    match self.inbox.wait() {
                        Some(action) => action,
                        None => break,
                    }
                }
            };
            self.set_state(WorkerState::Working);
            self.handle(action);
            self.processed.fetch_add(1, Ordering::Relaxed);
        }
        self.outbox.close();
        self.set_state(WorkerState::Done);
        debug!(worker = self.index, "worker exiting");
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn handle(&self, action: Action) {
        let Action { kind, reply } = action;
        let result = self.perform(kind);
        match reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(e) = result {
                    warn!(worker = self.index, error = %e, "action failed");
                }
            }
        }
    }

    fn perform(&self, kind: ActionKind) -> ActionResult {
        match kind {
            ActionKind::Send(envelope) => {
                envelope.validate()?;
                self.outbox
                    .add(envelope)
                    .map_err(|_| EngineError::Shutdown)?;
                Ok(Outcome::Queued)
            }
            ActionKind::Deliver(envelope) => {
                envelope.validate()?;
                Ok(Outcome::Delivered(self.pool.deliver_now(&envelope)))
            }
            ActionKind::Load { source, parent } => {
                let script = self.loader.load(&source)?;
                let id = self
                    .company
                    .create(script, parent, ThreadTag(self.index as u32))?;
                debug!(worker = self.index, node = %id, "actor loaded");
                Ok(Outcome::Loaded(id))
            }
            ActionKind::Bench(id) => {
                self.company.bench(id)?;
                Ok(Outcome::Benched)
            }
            ActionKind::Join { id, parent } => {
                self.company.join(id, parent)?;
                Ok(Outcome::Joined)
            }
            ActionKind::Delete(id) => {
                let released = self.company.delete(id)?;
                Ok(Outcome::Deleted(released.len()))
            }
        }
    }
}

/// Drain `outbox` into the delivery pool until it is closed and empty.
fn pump_loop<S: Script>(
    outbox: &Mailbox<Envelope>,
    pool: &DeliveryPool<S>,
    idle: Duration,
) {
    while let Ok(next) = outbox.next_timeout(idle) {
        if let Some(envelope) = next {
            pool.post_deliver(envelope);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_state_round_trips_through_u8() {
        for state in [WorkerState::Working, WorkerState::Waiting, WorkerState::Done] {
            assert_eq!(WorkerState::from_u8(state as u8), state);
        }
        assert_eq!(WorkerState::from_u8(200), WorkerState::Done);
    }

    #[test]
    fn reply_channel_carries_outcome() {
        let (action, rx) = Action::with_reply(ActionKind::Bench(NodeId::new(0, 1)));
        let Action { reply, .. } = action;
        reply.unwrap().send(Ok(Outcome::Benched)).unwrap();
        assert_eq!(rx.recv().unwrap(), Ok(Outcome::Benched));
    }

    #[test]
    fn fire_and_forget_has_no_reply() {
        let action = Action::new(ActionKind::Delete(NodeId::new(2, 1)));
        assert!(action.reply.is_none());
        assert_eq!(action.kind(), &ActionKind::Delete(NodeId::new(2, 1)));
    }
}
