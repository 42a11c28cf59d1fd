//! Delivery engine counters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Point-in-time engine statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Number of running delivery workers.
    pub active_workers: usize,
    /// Tasks accepted by the queue since startup.
    pub tasks_queued: u64,
    /// Tasks currently being executed.
    pub in_flight: u64,
    /// Tasks delivered successfully.
    pub succeeded: u64,
    /// Tasks an integration declined as not relevant.
    pub skipped: u64,
    /// Retries scheduled after failed attempts.
    pub retries_scheduled: u64,
    /// Tasks that ended `Failed`.
    pub permanent_failures: u64,
}

/// Lock-free counters shared by the queue and the workers.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    active_workers: AtomicUsize,
    tasks_queued: AtomicU64,
    in_flight: AtomicU64,
    succeeded: AtomicU64,
    skipped: AtomicU64,
    retries_scheduled: AtomicU64,
    permanent_failures: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn set_active_workers(&self, count: usize) {
        self.active_workers.store(count, Ordering::Relaxed);
    }

    pub(crate) fn task_queued(&self) {
        self.tasks_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_finished(&self) {
        // Saturates instead of wrapping if a finish is ever double counted.
        let _ = self
            .in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)));
    }

    pub(crate) fn succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn retry_scheduled(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) {
        self.permanent_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter.
    pub fn snapshot(&self) -> EngineStats {
        EngineStats {
            active_workers: self.active_workers.load(Ordering::Relaxed),
            tasks_queued: self.tasks_queued.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
        }
    }
}
