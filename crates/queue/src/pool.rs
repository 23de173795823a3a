//! Worker pool: one grouper, one avoid set, N workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tagbuffer_core::config::QueueConfig;
use tagbuffer_core::BufferKey;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::avoid::AvoidSet;
use crate::grouper::Grouper;
use crate::policy::{self, FailurePolicy, RemoveOnFailure};
use crate::processor::BatchProcessor;
use crate::stats::{PoolStats, StatsSnapshot};
use crate::store::BufferStore;
use crate::worker::{Worker, WorkerContext, DEFAULT_POLL_INTERVAL};

/// Fluent builder for a [`WorkerPool`].
///
/// # Example
/// ```ignore
/// let pool = WorkerPool::builder(store, processor)
///     .workers(4)
///     .poll_interval(Duration::from_millis(500))
///     .start();
/// pool.add(key);
/// ```
pub struct WorkerPoolBuilder {
    store: Arc<dyn BufferStore>,
    processor: Arc<dyn BatchProcessor>,
    policy: Arc<dyn FailurePolicy>,
    avoid: Arc<AvoidSet>,
    workers: usize,
    poll_interval: Duration,
}

impl WorkerPoolBuilder {
    /// Number of workers to spawn (default: 1, minimum: 1).
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sleep between polls when nothing is pending (default: 1s).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// What to do with files the processor reports as failed (default: remove).
    pub fn failure_policy(mut self, policy: Arc<dyn FailurePolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Share an existing avoid set instead of creating a fresh one.
    pub fn avoid_set(mut self, avoid: Arc<AvoidSet>) -> Self {
        self.avoid = avoid;
        self
    }

    /// Build the grouper and spawn the workers on the current tokio runtime.
    pub fn start(self) -> WorkerPool {
        let grouper = Arc::new(Grouper::new(self.avoid));
        let stats = Arc::new(PoolStats::new());
        let abort = Arc::new(AtomicBool::new(false));

        let ctx = WorkerContext {
            grouper: grouper.clone(),
            store: self.store,
            processor: self.processor,
            policy: self.policy,
            stats: stats.clone(),
            abort: abort.clone(),
            poll_interval: self.poll_interval,
        };

        let handles = (0..self.workers)
            .map(|id| tokio::spawn(Worker::new(id, ctx.clone()).run()))
            .collect();

        info!(
            workers = self.workers,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "worker pool started"
        );

        WorkerPool {
            grouper,
            stats,
            abort,
            handles,
        }
    }
}

/// Owns the shared grouper and the lifecycle of its workers.
///
/// Producers call [`add`](Self::add) as files land in the backing store.
/// [`stop`](Self::stop) is cooperative: every worker finishes its current
/// cycle before exiting.
pub struct WorkerPool {
    grouper: Arc<Grouper>,
    stats: Arc<PoolStats>,
    abort: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn builder(
        store: Arc<dyn BufferStore>,
        processor: Arc<dyn BatchProcessor>,
    ) -> WorkerPoolBuilder {
        WorkerPoolBuilder {
            store,
            processor,
            policy: Arc::new(RemoveOnFailure),
            avoid: Arc::new(AvoidSet::new()),
            workers: 1,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Start a pool configured from [`QueueConfig`].
    pub fn start(
        config: &QueueConfig,
        store: Arc<dyn BufferStore>,
        processor: Arc<dyn BatchProcessor>,
    ) -> Self {
        Self::builder(store, processor)
            .workers(config.workers as usize)
            .poll_interval(Duration::from_millis(config.poll_interval_ms))
            .failure_policy(policy::from_kind(config.failure_policy))
            .start()
    }

    /// Queue a key for processing. Never blocks on workers.
    pub fn add(&self, key: BufferKey) -> bool {
        self.grouper.add(key)
    }

    /// Ask every worker to exit after its current cycle.
    pub fn stop(&self) {
        info!("worker pool stopping");
        self.abort.store(true, Ordering::Release);
    }

    pub fn is_stopping(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    /// Wait for all workers to exit. Call [`stop`](Self::stop) first or this
    /// waits forever.
    pub async fn join(self) -> StatsSnapshot {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
        let snapshot = self.stats.snapshot();
        info!(?snapshot, "worker pool stopped");
        snapshot
    }

    /// `stop` followed by `join`.
    pub async fn shutdown(self) -> StatsSnapshot {
        self.stop();
        self.join().await
    }

    pub fn grouper(&self) -> &Arc<Grouper> {
        &self.grouper
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// No pending keys and no project in flight.
    pub fn is_drained(&self) -> bool {
        self.grouper.is_empty() && self.grouper.avoid_set().is_empty()
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }
}
