//! Filesystem-backed [`BatchProcessor`] used by the worker binary.
//!
//! Writes every file of a batch to `<root>/<project>/<asset>/<file>`. Each file
//! succeeds or fails on its own; only a failure to create the batch directory
//! fails the whole call.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::QueueError;
use crate::processor::{BatchProcessor, BatchRequest, BatchResponse, FileResult};

pub struct ArchiveProcessor {
    root: PathBuf,
}

impl ArchiveProcessor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// A bare file name: no separators, no parent references.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

#[async_trait]
impl BatchProcessor for ArchiveProcessor {
    async fn submit(&self, request: BatchRequest) -> Result<BatchResponse, QueueError> {
        let dir = self
            .root
            .join(request.project_id.to_string())
            .join(request.asset_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let mut results = Vec::with_capacity(request.files.len());
        for file in request.files {
            if !is_plain_file_name(&file.file_name) {
                warn!(
                    batch_id = %request.batch_id,
                    file = %file.file_name,
                    "refusing unsafe file name"
                );
                results.push(FileResult::failed(file.file_name, "unsafe file name"));
                continue;
            }

            let path = dir.join(&file.file_name);
            match tokio::fs::write(&path, &file.content).await {
                Ok(()) => {
                    debug!(path = %path.display(), bytes = file.content.len(), "archived");
                    results.push(FileResult::ok(file.file_name));
                }
                Err(e) => results.push(FileResult::failed(file.file_name, e.to_string())),
            }
        }

        Ok(BatchResponse { results })
    }
}
