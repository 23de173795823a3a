//! Counters shared by all workers of a pool.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct PoolStats {
    cycles: AtomicU64,
    idle_cycles: AtomicU64,
    groups_processed: AtomicU64,
    files_submitted: AtomicU64,
    files_missing: AtomicU64,
    files_failed: AtomicU64,
    files_removed: AtomicU64,
    files_retained: AtomicU64,
    files_requeued: AtomicU64,
    cycle_errors: AtomicU64,
}

/// Point-in-time copy of [`PoolStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub idle_cycles: u64,
    pub groups_processed: u64,
    pub files_submitted: u64,
    pub files_missing: u64,
    pub files_failed: u64,
    pub files_removed: u64,
    pub files_retained: u64,
    /// Keys put back in the grouper after a failed or partial cycle.
    pub files_requeued: u64,
    pub cycle_errors: u64,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_idle(&self) {
        self.idle_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_group(&self) {
        self.groups_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_submitted(&self, n: usize) {
        self.files_submitted.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_missing(&self) {
        self.files_missing.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.files_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removed(&self) {
        self.files_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retained(&self) {
        self.files_retained.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_requeued(&self, n: usize) {
        self.files_requeued.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.cycle_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            idle_cycles: self.idle_cycles.load(Ordering::Relaxed),
            groups_processed: self.groups_processed.load(Ordering::Relaxed),
            files_submitted: self.files_submitted.load(Ordering::Relaxed),
            files_missing: self.files_missing.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            files_removed: self.files_removed.load(Ordering::Relaxed),
            files_retained: self.files_retained.load(Ordering::Relaxed),
            files_requeued: self.files_requeued.load(Ordering::Relaxed),
            cycle_errors: self.cycle_errors.load(Ordering::Relaxed),
        }
    }
}
