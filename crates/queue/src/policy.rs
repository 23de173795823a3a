//! What to do with a file the processor reported as failed.

use std::sync::Arc;

use tagbuffer_core::config::FailurePolicyKind;
use tagbuffer_core::BufferKey;

/// Decision for one failed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Delete the file from the buffer.
    Remove,
    /// Keep the file in the buffer and queue its key again.
    Retain,
}

/// Single decision point consulted by the worker for every failed file.
pub trait FailurePolicy: Send + Sync {
    fn on_failed_file(&self, key: &BufferKey, error: Option<&str>) -> FailureAction;
}

/// Failed files are dropped from the buffer like successful ones.
/// No retry, no dead-letter; the failure only shows up in the logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoveOnFailure;

impl FailurePolicy for RemoveOnFailure {
    fn on_failed_file(&self, _key: &BufferKey, _error: Option<&str>) -> FailureAction {
        FailureAction::Remove
    }
}

/// Failed files stay in the buffer and are picked up again once their
/// project is released.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetainOnFailure;

impl FailurePolicy for RetainOnFailure {
    fn on_failed_file(&self, _key: &BufferKey, _error: Option<&str>) -> FailureAction {
        FailureAction::Retain
    }
}

/// Build the policy selected in config.
pub fn from_kind(kind: FailurePolicyKind) -> Arc<dyn FailurePolicy> {
    match kind {
        FailurePolicyKind::Remove => Arc::new(RemoveOnFailure),
        FailurePolicyKind::Retain => Arc::new(RetainOnFailure),
    }
}
