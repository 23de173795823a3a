//! Downstream batch processor contract.
//!
//! The worker hands one [`BatchRequest`] per extracted group to a
//! [`BatchProcessor`] and reconciles the buffer from the per-file results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tagbuffer_core::{AssetId, BufferItem, ProjectId};
use uuid::Uuid;

use crate::error::QueueError;

/// One file inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFile {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl From<BufferItem> for BatchFile {
    fn from(item: BufferItem) -> Self {
        Self {
            file_name: item.file_name,
            content: item.content,
        }
    }
}

/// All fetched files of one group, submitted together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Correlation id for logs.
    pub batch_id: Uuid,
    pub project_id: ProjectId,
    pub asset_id: AssetId,
    pub files: Vec<BatchFile>,
}

/// Outcome for a single submitted file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileResult {
    pub file_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileResult {
    pub fn ok(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(file_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<FileResult>,
}

/// Turns a batch of raw TAG files into site-model mutations.
///
/// Called synchronously from the worker loop and never retried. An `Err` means
/// the whole call failed; individual file failures are reported in the
/// response instead.
#[async_trait]
pub trait BatchProcessor: Send + Sync {
    async fn submit(&self, request: BatchRequest) -> Result<BatchResponse, QueueError>;
}
