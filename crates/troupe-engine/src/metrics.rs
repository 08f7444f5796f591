//! Delivery and stage counters.
//!
//! [`DeliveryMetrics`] is updated lock-free by producers and delivery
//! agents; [`DeliveryStats`] and [`StageMetrics`] are the plain snapshots
//! handed to callers.

use std::sync::atomic::{AtomicU64, Ordering};

use troupe_arena::TreeStats;

use crate::worker::WorkerState;

/// Live delivery counters shared by the pool and its agents.
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    accepted: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    unresolved: AtomicU64,
}

impl DeliveryMetrics {
    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unresolved(&self) {
        self.unresolved.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time delivery counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Envelopes handed to a delivery agent.
    pub accepted: u64,
    /// Envelopes refused because every agent was busy.
    pub dropped: u64,
    /// Successful `on_message` calls.
    pub delivered: u64,
    /// `on_message` calls that returned an error, plus recipients that
    /// vanished between resolution and delivery.
    pub failed: u64,
    /// Envelopes whose audience could not be resolved (stale sender,
    /// stale recipient, lock failure).
    pub unresolved: u64,
}

/// Snapshot of a running stage.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageMetrics {
    /// Delivery pool counters.
    pub delivery: DeliveryStats,
    /// Arena slot counts per lifecycle state.
    pub tree: TreeStats,
    /// Actions processed by each worker, indexed by worker.
    pub processed: Vec<u64>,
    /// Current state of each worker, indexed by worker.
    pub workers: Vec<WorkerState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = DeliveryMetrics::default();
        assert_eq!(m.snapshot(), DeliveryStats::default());
        let s = StageMetrics::default();
        assert!(s.processed.is_empty());
        assert!(s.workers.is_empty());
        assert_eq!(s.tree.capacity, 0);
    }

    #[test]
    fn counters_accumulate() {
        let m = DeliveryMetrics::default();
        m.record_accepted();
        m.record_accepted();
        m.record_dropped();
        m.record_delivered();
        m.record_failed();
        m.record_unresolved();
        assert_eq!(
            m.snapshot(),
            DeliveryStats {
                accepted: 2,
                dropped: 1,
                delivered: 1,
                failed: 1,
                unresolved: 1,
            }
        );
    }
}
