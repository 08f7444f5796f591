//! Delivery agent pool.
//!
//! Each agent owns a single-slot hand-off channel and a busy flag.
//! [`DeliveryPool::post_deliver`] offers an envelope to the agents in
//! round-robin order, skipping any that are busy, and never blocks: if no
//! agent takes the envelope it is dropped on the spot.
//!
//! ```text
//! Producer (worker pump, Stage::send)       Agent i
//!     |                                        |
//!     |--try_send(env)--> [bounded(1)] ---> rx.recv()
//!     |                                     busy = true
//!     |                                     copy message
//!     |                                     resolve audience
//!     |                                     on_message × N
//!     |                                     busy = false
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, info, trace, warn};
use troupe_core::{Envelope, Script};

use crate::company::Company;
use crate::error::ConfigError;
use crate::metrics::{DeliveryMetrics, DeliveryStats};
use crate::tone::resolve_audience;

/// Outcome of [`DeliveryPool::post_deliver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Posted {
    /// The agent with this index took the envelope.
    Accepted(usize),
    /// Every agent was busy or the pool is shut down.
    Dropped,
}

/// What one delivery did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Size of the resolved audience.
    pub recipients: usize,
    /// Recipients whose `on_message` succeeded.
    pub delivered: usize,
    /// Recipients whose `on_message` failed or who vanished first.
    pub failed: usize,
}

/// A fixed pool of delivery agents bound to one company.
pub struct DeliveryPool<S> {
    company: Company<S>,
    senders: RwLock<Vec<Sender<Envelope>>>,
    busy: Arc<[AtomicBool]>,
    cursor: AtomicUsize,
    handles: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<DeliveryMetrics>,
}

impl<S: Script> DeliveryPool<S> {
    /// Spawn `agent_count` agents delivering into `company`.
    pub fn start(company: Company<S>, agent_count: usize) -> Result<Self, ConfigError> {
        let agent_count = agent_count.max(1);
        let busy: Arc<[AtomicBool]> = (0..agent_count)
            .map(|_| AtomicBool::new(false))
            .collect::<Vec<_>>()
            .into();
        let metrics = Arc::new(DeliveryMetrics::default());
        let pool = Self {
            company,
            senders: RwLock::new(Vec::with_capacity(agent_count)),
            busy,
            cursor: AtomicUsize::new(0),
            handles: Mutex::new(Vec::with_capacity(agent_count)),
            metrics,
        };

        for index in 0..agent_count {
            let (tx, rx) = crossbeam_channel::bounded(1);
            let agent = Agent {
                index,
                rx,
                company: pool.company.clone(),
                busy: Arc::clone(&pool.busy),
                metrics: Arc::clone(&pool.metrics),
            };
            let name = format!("troupe-postman-{index}");
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || agent.run())
                .map_err(|e| ConfigError::ThreadSpawnFailed {
                    name,
                    reason: e.to_string(),
                })?;
            pool.senders_mut().push(tx);
            pool.handles_mut().push(handle);
        }
        info!(agents = agent_count, "delivery pool started");
        Ok(pool)
    }

    /// Hand `envelope` to a free agent without blocking.
    pub fn post_deliver(&self, envelope: Envelope) -> Posted {
        let senders = self.senders.read().unwrap_or_else(PoisonError::into_inner);
        let n = senders.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        let mut envelope = envelope;
        for offset in 0..n {
            let index = (start + offset) % n;
            if self.busy[index].load(Ordering::Acquire) {
                continue;
            }
            match senders[index].try_send(envelope) {
                Ok(()) => {
                    self.metrics.record_accepted();
                    trace!(agent = index, "envelope accepted");
                    return Posted::Accepted(index);
                }
                Err(TrySendError::Full(back) | TrySendError::Disconnected(back)) => {
                    envelope = back;
                }
            }
        }
        self.metrics.record_dropped();
        warn!(
            sender = %envelope.sender(),
            tone = %envelope.tone(),
            "no delivery agent free; envelope dropped"
        );
        Posted::Dropped
    }

    /// Deliver `envelope` on the calling thread.
    pub fn deliver_now(&self, envelope: &Envelope) -> DeliveryReport {
        deliver(&self.company, envelope, envelope.message(), &self.metrics)
    }

    /// Current counters.
    pub fn metrics(&self) -> DeliveryStats {
        self.metrics.snapshot()
    }

    /// Number of agents.
    pub fn agent_count(&self) -> usize {
        self.busy.len()
    }

    /// Whether agent `index` is currently delivering.
    pub fn is_busy(&self, index: usize) -> bool {
        self.busy
            .get(index)
            .is_some_and(|b| b.load(Ordering::Acquire))
    }

    /// Stop accepting envelopes, let every agent finish what it holds, and
    /// join them. Returns the number of agents joined. Idempotent.
    pub fn shutdown(&self) -> usize {
        self.senders_mut().clear();
        let handles: Vec<_> = self.handles_mut().drain(..).collect();
        let mut joined = 0;
        for handle in handles {
            if handle.join().is_ok() {
                joined += 1;
            }
        }
        if joined > 0 {
            info!(agents = joined, "delivery pool stopped");
        }
        joined
    }

    fn senders_mut(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Sender<Envelope>>> {
        self.senders.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn handles_mut(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> Drop for DeliveryPool<S> {
    fn drop(&mut self) {
        self.senders
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        let handles = self.handles.get_mut().unwrap_or_else(PoisonError::into_inner);
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }
}

// ── Agent ────────────────────────────────────────────────────────

struct Agent<S> {
    index: usize,
    rx: Receiver<Envelope>,
    company: Company<S>,
    busy: Arc<[AtomicBool]>,
    metrics: Arc<DeliveryMetrics>,
}

impl<S: Script> Agent<S> {
    /// Runs until every sender is dropped and the slot is empty.
    fn run(self) {
        let mut buffer = Vec::new();
        while let Ok(envelope) = self.rx.recv() {
            self.busy[self.index].store(true, Ordering::Release);
            buffer.clear();
            buffer.extend_from_slice(envelope.message());
            deliver(&self.company, &envelope, &buffer, &self.metrics);
            self.busy[self.index].store(false, Ordering::Release);
        }
        debug!(agent = self.index, "delivery agent exiting");
    }
}

/// Resolve the audience of `envelope` and call each recipient in order.
///
/// Failures are per recipient: one failing script never stops the rest.
fn deliver<S: Script>(
    company: &Company<S>,
    envelope: &Envelope,
    message: &[u8],
    metrics: &DeliveryMetrics,
) -> DeliveryReport {
    let author = envelope.sender();
    let audience = match resolve_audience(
        company.tree(),
        author,
        envelope.tone(),
        envelope.recipient(),
    ) {
        Ok(audience) => audience,
        Err(e) => {
            metrics.record_unresolved();
            warn!(sender = %author, tone = %envelope.tone(), error = %e, "audience unresolved");
            return DeliveryReport::default();
        }
    };

    let mut report = DeliveryReport {
        recipients: audience.len(),
        ..DeliveryReport::default()
    };
    for id in audience {
        match company.with_actor(id, |script| script.on_message(message, author)) {
            Ok(Ok(())) => {
                metrics.record_delivered();
                report.delivered += 1;
                trace!(node = %id, sender = %author, "delivered");
            }
            Ok(Err(e)) => {
                metrics.record_failed();
                report.failed += 1;
                warn!(node = %id, sender = %author, error = %e, "script rejected message");
            }
            Err(e) => {
                metrics.record_failed();
                report.failed += 1;
                debug!(node = %id, error = %e, "recipient vanished before delivery");
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use troupe_arena::ArenaConfig;
    use troupe_core::{NodeId, ScriptError, ThreadTag, Tone};

    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<(NodeId, Vec<u8>)>>>);

    struct Listener {
        me: Option<NodeId>,
        log: Log,
        fail: bool,
    }

    impl Script for Listener {
        fn on_message(&mut self, message: &[u8], _author: NodeId) -> Result<(), ScriptError> {
            if let Some(me) = self.me {
                self.log.0.lock().unwrap().push((me, message.to_vec()));
            }
            if self.fail {
                return Err(ScriptError::runtime("nope"));
            }
            Ok(())
        }

        fn on_load(&mut self, id: NodeId) -> Result<(), ScriptError> {
            self.me = Some(id);
            Ok(())
        }
    }

    fn setup(fail_child: bool) -> (Company<Listener>, Log, NodeId, Vec<NodeId>) {
        let company = Company::new(ArenaConfig::new(8)).unwrap();
        let log = Log::default();
        let listener = |fail| Listener {
            me: None,
            log: log.clone(),
            fail,
        };
        let root = company.create(listener(false), None, ThreadTag(0)).unwrap();
        let kids = (0..3)
            .map(|i| {
                company
                    .create(listener(fail_child && i == 1), Some(root), ThreadTag(0))
                    .unwrap()
            })
            .collect();
        (company, log, root, kids)
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn deliver_now_serves_audience_in_order() {
        let (company, log, root, kids) = setup(false);
        let pool = DeliveryPool::start(company, 1).unwrap();
        let report = pool.deliver_now(&Envelope::new(root, Tone::Command, b"go".to_vec()));
        assert_eq!(
            report,
            DeliveryReport {
                recipients: 3,
                delivered: 3,
                failed: 0
            }
        );
        let heard: Vec<_> = log.0.lock().unwrap().iter().map(|(id, _)| *id).collect();
        assert_eq!(heard, kids);
    }

    #[test]
    fn one_failing_recipient_does_not_stop_the_rest() {
        let (company, _log, root, _kids) = setup(true);
        let pool = DeliveryPool::start(company, 1).unwrap();
        let report = pool.deliver_now(&Envelope::new(root, Tone::Command, b"go".to_vec()));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(pool.metrics().failed, 1);
    }

    #[test]
    fn posted_envelope_is_delivered_by_an_agent() {
        let (company, log, root, kids) = setup(false);
        let pool = DeliveryPool::start(company, 2).unwrap();
        let posted = pool.post_deliver(Envelope::whisper(root, kids[2], b"psst".to_vec()));
        assert!(matches!(posted, Posted::Accepted(_)));
        assert!(wait_until(|| pool.metrics().delivered == 1));
        assert_eq!(log.0.lock().unwrap().as_slice(), &[(kids[2], b"psst".to_vec())]);
        assert_eq!(pool.shutdown(), 2);
    }

    #[test]
    fn unresolvable_envelope_is_counted() {
        let (company, _log, root, _kids) = setup(false);
        let pool = DeliveryPool::start(company.clone(), 1).unwrap();
        company.delete(root).unwrap();
        let report = pool.deliver_now(&Envelope::new(root, Tone::Yell, b"?".to_vec()));
        assert_eq!(report, DeliveryReport::default());
        assert_eq!(pool.metrics().unresolved, 1);
    }

    #[test]
    fn shutdown_pool_drops_everything() {
        let (company, _log, root, _kids) = setup(false);
        let pool = DeliveryPool::start(company, 2).unwrap();
        assert_eq!(pool.shutdown(), 2);
        assert_eq!(pool.shutdown(), 0);
        assert_eq!(
            pool.post_deliver(Envelope::new(root, Tone::Think, b"x".to_vec())),
            Posted::Dropped
        );
        assert_eq!(pool.metrics().dropped, 1);
    }
}
