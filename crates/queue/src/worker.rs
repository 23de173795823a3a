//! The worker loop: extract a group, fetch its files, submit them as one
//! batch, reconcile the buffer, release the project.
//!
//! A [`Worker`] repeats [`run_cycle`](Worker::run_cycle) until the shared abort
//! flag is set. The flag is checked once per cycle at the top of the loop; a
//! cycle that already started always runs to completion. Errors and panics
//! inside a cycle are logged and swallowed so the worker keeps going, and the
//! claimed project is released by a drop guard no matter how the cycle ends.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tagbuffer_core::{AssetId, BufferKey, ProjectId};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::QueueError;
use crate::grouper::{Group, Grouper};
use crate::policy::{FailureAction, FailurePolicy, RemoveOnFailure};
use crate::processor::{BatchFile, BatchProcessor, BatchRequest, BatchResponse};
use crate::stats::PoolStats;
use crate::store::BufferStore;

/// Default sleep between polls when nothing is pending.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

// ── Shared context ───────────────────────────────────────────────────

/// Everything a worker shares with the rest of its pool.
#[derive(Clone)]
pub struct WorkerContext {
    pub grouper: Arc<Grouper>,
    pub store: Arc<dyn BufferStore>,
    pub processor: Arc<dyn BatchProcessor>,
    pub policy: Arc<dyn FailurePolicy>,
    pub stats: Arc<PoolStats>,
    pub abort: Arc<AtomicBool>,
    pub poll_interval: Duration,
}

impl WorkerContext {
    /// Context with the remove-on-failure policy, fresh stats, and the default
    /// poll interval.
    pub fn new(
        grouper: Arc<Grouper>,
        store: Arc<dyn BufferStore>,
        processor: Arc<dyn BatchProcessor>,
    ) -> Self {
        Self {
            grouper,
            store,
            processor,
            policy: Arc::new(RemoveOnFailure),
            stats: Arc::new(PoolStats::new()),
            abort: Arc::new(AtomicBool::new(false)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

// ── Cycle results ────────────────────────────────────────────────────

/// What happened to one extracted group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    pub project_id: ProjectId,
    pub asset_id: AssetId,
    /// Keys handed out by the grouper.
    pub extracted: usize,
    /// Items found in the store and submitted.
    pub submitted: usize,
    /// Keys with no entry in the store.
    pub missing: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub removed: usize,
    pub retained: usize,
    /// Submitted keys the processor gave no result for, put back in the grouper.
    pub requeued: usize,
}

impl GroupReport {
    fn new(group: &Group) -> Self {
        Self {
            project_id: group.project_id,
            asset_id: group.asset_id,
            extracted: group.len(),
            submitted: 0,
            missing: 0,
            succeeded: 0,
            failed: 0,
            removed: 0,
            retained: 0,
            requeued: 0,
        }
    }
}

/// Result of a single [`Worker::run_cycle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was eligible; the worker slept for the poll interval.
    Idle,
    /// A group was processed to completion.
    Processed(GroupReport),
    /// A group was extracted but the cycle failed or panicked. Keys that were
    /// not yet removed went back to the grouper.
    Failed { project_id: ProjectId, requeued: usize },
}

// ── Release guard ────────────────────────────────────────────────────

/// Releases a claimed project when dropped.
struct ReleaseGuard<'a> {
    grouper: &'a Grouper,
    project_id: ProjectId,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if !self.grouper.release_project(self.project_id) {
            warn!(project_id = %self.project_id, "project was not claimed at release");
        }
    }
}

/// The batch as it was handed to the processor.
struct SubmittedBatch {
    batch_id: Uuid,
    project_id: ProjectId,
    asset_id: AssetId,
    file_names: HashSet<String>,
}

// ── Worker ───────────────────────────────────────────────────────────

pub struct Worker {
    id: usize,
    ctx: WorkerContext,
}

impl Worker {
    pub fn new(id: usize, ctx: WorkerContext) -> Self {
        Self { id, ctx }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Run cycles until the abort flag is observed.
    ///
    /// A failed cycle is followed by one poll interval of sleep before the
    /// next attempt.
    pub async fn run(self) {
        info!(worker = self.id, "worker started");
        while !self.ctx.abort.load(Ordering::Acquire) {
            if let CycleOutcome::Failed { .. } = self.run_cycle().await {
                tokio::time::sleep(self.ctx.poll_interval).await;
            }
        }
        info!(worker = self.id, "worker stopped");
    }

    /// One polling cycle. Never fails; problems are logged and reported in
    /// the returned outcome.
    ///
    /// Every extracted key ends the cycle either settled (removed, known
    /// missing, or retained by the failure policy) or back in the grouper.
    /// Re-queueing happens while the project is still claimed.
    pub async fn run_cycle(&self) -> CycleOutcome {
        self.ctx.stats.record_cycle();

        let Some(group) = self.ctx.grouper.extract() else {
            self.ctx.stats.record_idle();
            tokio::time::sleep(self.ctx.poll_interval).await;
            return CycleOutcome::Idle;
        };

        let project_id = group.project_id;
        let _release = ReleaseGuard {
            grouper: &self.ctx.grouper,
            project_id,
        };

        let mut settled = HashSet::with_capacity(group.len());
        let result = AssertUnwindSafe(self.process_group(&group, &mut settled))
            .catch_unwind()
            .await;
        let requeued = self.requeue_unsettled(&group, &settled);

        match result {
            Ok(Ok(mut report)) => {
                report.requeued = requeued;
                self.ctx.stats.record_group();
                info!(
                    worker = self.id,
                    %project_id,
                    asset_id = %report.asset_id,
                    submitted = report.submitted,
                    missing = report.missing,
                    failed = report.failed,
                    removed = report.removed,
                    requeued,
                    "group processed"
                );
                CycleOutcome::Processed(report)
            }
            Ok(Err(e)) => {
                self.ctx.stats.record_error();
                error!(
                    worker = self.id,
                    %project_id,
                    requeued,
                    error = %e,
                    "group processing failed"
                );
                CycleOutcome::Failed { project_id, requeued }
            }
            Err(panic) => {
                self.ctx.stats.record_error();
                error!(
                    worker = self.id,
                    %project_id,
                    requeued,
                    panic = %panic_message(&*panic),
                    "group processing panicked"
                );
                CycleOutcome::Failed { project_id, requeued }
            }
        }
    }

    async fn process_group(
        &self,
        group: &Group,
        settled: &mut HashSet<BufferKey>,
    ) -> Result<GroupReport, QueueError> {
        let mut report = GroupReport::new(group);

        let mut items = Vec::with_capacity(group.len());
        for key in &group.keys {
            match self.ctx.store.get(key).await {
                Ok(item) => items.push(item),
                Err(e) if e.is_not_found() => {
                    self.ctx.stats.record_missing();
                    report.missing += 1;
                    settled.insert(key.clone());
                    warn!(worker = self.id, %key, "buffered file not found, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        let Some(first) = items.first() else {
            debug!(worker = self.id, project_id = %group.project_id, "no files left to submit");
            return Ok(report);
        };

        let request = BatchRequest {
            batch_id: Uuid::new_v4(),
            project_id: group.project_id,
            asset_id: first.asset_id,
            files: items.into_iter().map(BatchFile::from).collect(),
        };
        let mut batch = SubmittedBatch {
            batch_id: request.batch_id,
            project_id: request.project_id,
            asset_id: request.asset_id,
            file_names: request.files.iter().map(|f| f.file_name.clone()).collect(),
        };
        report.submitted = request.files.len();
        self.ctx.stats.record_submitted(report.submitted);

        debug!(
            worker = self.id,
            batch_id = %batch.batch_id,
            files = report.submitted,
            "submitting batch"
        );
        let response = self.ctx.processor.submit(request).await?;

        self.reconcile(&mut batch, response, &mut report, settled)
            .await?;
        Ok(report)
    }

    /// Apply per-file outcomes to the buffer.
    ///
    /// Only results for files of this batch are acted on, each at most once.
    async fn reconcile(
        &self,
        batch: &mut SubmittedBatch,
        response: BatchResponse,
        report: &mut GroupReport,
        settled: &mut HashSet<BufferKey>,
    ) -> Result<(), QueueError> {
        let batch_id = batch.batch_id;

        for result in response.results {
            if !batch.file_names.remove(&result.file_name) {
                warn!(
                    worker = self.id,
                    %batch_id,
                    file = %result.file_name,
                    "ignoring result for a file not in this batch"
                );
                continue;
            }
            let key = BufferKey::new(batch.project_id, batch.asset_id, result.file_name);

            if result.success {
                report.succeeded += 1;
            } else {
                report.failed += 1;
                self.ctx.stats.record_failed();
                let error = result.error.as_deref();
                warn!(
                    worker = self.id,
                    %batch_id,
                    %key,
                    error = error.unwrap_or("unknown"),
                    "processor reported file failure"
                );

                if self.ctx.policy.on_failed_file(&key, error) == FailureAction::Retain {
                    report.retained += 1;
                    self.ctx.stats.record_retained();
                    self.ctx.grouper.add(key.clone());
                    settled.insert(key);
                    continue;
                }
            }

            if self.ctx.store.remove(&key).await? {
                report.removed += 1;
                self.ctx.stats.record_removed();
            } else {
                warn!(worker = self.id, %key, "file already gone from buffer at removal");
            }
            settled.insert(key);
        }

        for file in &batch.file_names {
            warn!(worker = self.id, %batch_id, %file, "processor returned no result for file");
        }
        Ok(())
    }

    /// Put back every key of `group` that did not reach a final state.
    fn requeue_unsettled(&self, group: &Group, settled: &HashSet<BufferKey>) -> usize {
        let mut requeued = 0;
        for key in group.keys.iter().filter(|key| !settled.contains(*key)) {
            if self.ctx.grouper.add(key.clone()) {
                requeued += 1;
            }
        }
        if requeued > 0 {
            self.ctx.stats.record_requeued(requeued);
            debug!(worker = self.id, project_id = %group.project_id, requeued, "re-queued keys");
        }
        requeued
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
