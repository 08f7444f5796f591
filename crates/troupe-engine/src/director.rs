//! Action dispatch across the worker pool.
//!
//! [`Director::dispatch`] picks a uniformly random starting worker and
//! offers the action to each inbox in turn without blocking. The random
//! start spreads load without a shared cursor; seeding it (see
//! [`StageConfig::seed`](crate::config::StageConfig::seed)) makes the
//! choice of worker reproducible.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, trace};
use troupe_core::ScriptLoader;

use crate::error::{ConfigError, DispatchError};
use crate::mailbox::MailboxError;
use crate::worker::{Action, WorkerHandle, WorkerSetup, WorkerState};

/// Joined-thread counts from [`Director::stop`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Worker threads joined.
    pub workers_joined: usize,
    /// Outbox pump threads joined.
    pub pumps_joined: usize,
}

/// Owner of the worker pool.
pub struct Director {
    workers: Vec<WorkerHandle>,
    rng: Mutex<ChaCha8Rng>,
    stopped: AtomicBool,
}

impl Director {
    /// Spawn `worker_count` workers sharing `setup`.
    pub(crate) fn start<L: ScriptLoader>(
        setup: &WorkerSetup<L>,
        worker_count: usize,
        seed: Option<u64>,
    ) -> Result<Self, ConfigError> {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        let mut director = Self {
            workers: Vec::with_capacity(worker_count),
            rng: Mutex::new(rng),
            stopped: AtomicBool::new(false),
        };
        for index in 0..worker_count.max(1) {
            // On failure, dropping `director` stops the workers already spawned.
            director.workers.push(WorkerHandle::spawn(index, setup)?);
        }
        info!(workers = director.workers.len(), "director started");
        Ok(director)
    }

    /// Offer `action` to the workers, starting at a random one, without
    /// blocking. Returns the index of the worker that accepted it.
    pub fn dispatch(&self, action: Action) -> Result<usize, DispatchError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(DispatchError::Shutdown(action));
        }
        let n = self.workers.len();
        let start = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random_range(0..n);
        let mut action = action;
        for offset in 0..n {
            let index = (start + offset) % n;
            match self.workers[index].inbox().add(action) {
                Ok(()) => {
                    trace!(worker = index, "action dispatched");
                    return Ok(index);
                }
                Err(MailboxError::Full(back)) => action = back,
                Err(MailboxError::Closed(back)) => return Err(DispatchError::Shutdown(back)),
            }
        }
        Err(DispatchError::Saturated(action))
    }

    /// Number of workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Current state of each worker.
    pub fn states(&self) -> Vec<WorkerState> {
        self.workers.iter().map(WorkerHandle::state).collect()
    }

    /// Actions processed by each worker so far.
    pub fn processed(&self) -> Vec<u64> {
        self.workers.iter().map(WorkerHandle::processed).collect()
    }

    /// Whether [`stop`](Self::stop) has begun.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Refuse new actions, let every worker drain its inbox, and join the
    /// workers and their pumps. Idempotent.
    pub fn stop(&mut self) -> StopReport {
        self.stopped.store(true, Ordering::Release);
        for worker in &self.workers {
            worker.close();
        }
        let mut report = StopReport::default();
        for worker in &mut self.workers {
            let (worker_joined, pump_joined) = worker.join();
            report.workers_joined += usize::from(worker_joined);
            report.pumps_joined += usize::from(pump_joined);
        }
        if report.workers_joined > 0 {
            info!(
                workers = report.workers_joined,
                pumps = report.pumps_joined,
                "director stopped"
            );
        }
        report
    }
}

impl Drop for Director {
    fn drop(&mut self) {
        self.stop();
    }
}

// Compile-time assertion: Director is Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Director>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use troupe_arena::ArenaConfig;
    use troupe_core::{NodeId, Script, ScriptError};

    use crate::company::Company;
    use crate::postman::DeliveryPool;
    use crate::worker::{ActionKind, Outcome};

    struct Quiet;

    impl Script for Quiet {
        fn on_message(&mut self, _message: &[u8], _author: NodeId) -> Result<(), ScriptError> {
            Ok(())
        }
    }

    struct QuietLoader;

    impl ScriptLoader for QuietLoader {
        type Script = Quiet;

        fn load(&self, source: &str) -> Result<Quiet, ScriptError> {
            if source.is_empty() {
                Err(ScriptError::load("empty"))
            } else {
                Ok(Quiet)
            }
        }
    }

    fn director(workers: usize) -> (Director, Company<Quiet>) {
        let company = Company::new(ArenaConfig::new(8)).unwrap();
        let pool = Arc::new(DeliveryPool::start(company.clone(), 1).unwrap());
        let setup = WorkerSetup {
            company: company.clone(),
            loader: Arc::new(QuietLoader),
            pool,
            inbox_capacity: 4,
            outbox_idle: Duration::from_millis(1),
        };
        (Director::start(&setup, workers, Some(7)).unwrap(), company)
    }

    #[test]
    fn load_through_director_tags_worker_thread() {
        let (director, company) = director(2);
        let (action, reply) = Action::with_reply(ActionKind::Load {
            source: "quiet".into(),
            parent: None,
        });
        let worker = director.dispatch(action).unwrap();
        let Ok(Outcome::Loaded(id)) = reply.recv().unwrap() else {
            panic!("load did not succeed");
        };
        assert_eq!(company.thread(id).unwrap().0 as usize, worker);
        assert_eq!(company.root().unwrap(), Some(id));
    }

    #[test]
    fn failed_load_is_reported() {
        let (director, _company) = director(1);
        let (action, reply) = Action::with_reply(ActionKind::Load {
            source: String::new(),
            parent: None,
        });
        director.dispatch(action).unwrap();
        assert_eq!(
            reply.recv().unwrap(),
            Err(crate::error::EngineError::Script(ScriptError::load("empty")))
        );
    }

    #[test]
    fn seeded_directors_pick_the_same_first_worker() {
        let (a, _) = director(4);
        let (b, _) = director(4);
        let first_a = a.dispatch(Action::new(ActionKind::Delete(NodeId::new(0, 9)))).unwrap();
        let first_b = b.dispatch(Action::new(ActionKind::Delete(NodeId::new(0, 9)))).unwrap();
        assert_eq!(first_a, first_b);
    }

    #[test]
    fn stopped_director_hands_action_back() {
        let (mut director, _company) = director(2);
        let report = director.stop();
        assert_eq!(
            report,
            StopReport {
                workers_joined: 2,
                pumps_joined: 2
            }
        );
        assert!(director.states().iter().all(|s| *s == WorkerState::Done));
        let err = director
            .dispatch(Action::new(ActionKind::Bench(NodeId::new(0, 1))))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Shutdown(_)));
        assert_eq!(director.stop(), StopReport::default());
    }
}
