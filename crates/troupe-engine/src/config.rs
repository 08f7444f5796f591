//! Stage configuration and validation.

use std::time::Duration;

use troupe_arena::ArenaConfig;

use crate::error::ConfigError;

// ── StageConfig ────────────────────────────────────────────────────

/// Configuration for a [`Stage`](crate::stage::Stage).
///
/// Controls the arena, the size of the worker and delivery-agent pools,
/// worker inbox depth, and the dispatcher's random start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageConfig {
    /// Node arena sizing.
    pub arena: ArenaConfig,
    /// Number of worker threads. `None` = auto-detect
    /// (`available_parallelism / 2`, clamped to `[2, 16]`).
    pub worker_count: Option<usize>,
    /// Number of delivery agents. `None` = auto-detect
    /// (`available_parallelism`, clamped to `[2, 16]`).
    pub agent_count: Option<usize>,
    /// Maximum queued actions per worker before the director moves on to
    /// the next worker. Default: 64.
    pub inbox_capacity: usize,
    /// How long a worker's outbox pump waits for an envelope before
    /// checking again, in milliseconds. Default: 10.
    pub outbox_idle_ms: u64,
    /// Seed for the director's start-index generator. `None` seeds from
    /// the thread-local RNG.
    pub seed: Option<u64>,
}

impl StageConfig {
    /// Default per-worker inbox depth.
    pub const DEFAULT_INBOX_CAPACITY: usize = 64;

    /// Default outbox pump idle interval.
    pub const DEFAULT_OUTBOX_IDLE_MS: u64 = 10;

    /// Upper bound applied to explicit pool sizes.
    pub const MAX_POOL_SIZE: usize = 64;

    /// Resolve the worker count, applying auto-detection if `None`.
    ///
    /// Explicit values are clamped to `[1, 64]`.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.clamp(1, Self::MAX_POOL_SIZE),
            None => (available_cpus() / 2).clamp(2, 16),
        }
    }

    /// Resolve the delivery agent count, applying auto-detection if `None`.
    ///
    /// Explicit values are clamped to `[1, 64]`.
    pub fn resolved_agent_count(&self) -> usize {
        match self.agent_count {
            Some(n) => n.clamp(1, Self::MAX_POOL_SIZE),
            None => available_cpus().clamp(2, 16),
        }
    }

    /// Outbox pump idle interval as a `Duration`.
    pub fn outbox_idle(&self) -> Duration {
        Duration::from_millis(self.outbox_idle_ms)
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.arena.validate()?;
        if self.inbox_capacity == 0 {
            return Err(ConfigError::InboxCapacityZero);
        }
        if self.outbox_idle_ms == 0 {
            return Err(ConfigError::OutboxIdleZero);
        }
        Ok(())
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            arena: ArenaConfig::default(),
            worker_count: None,
            agent_count: None,
            inbox_capacity: Self::DEFAULT_INBOX_CAPACITY,
            outbox_idle_ms: Self::DEFAULT_OUTBOX_IDLE_MS,
            seed: None,
        }
    }
}

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
