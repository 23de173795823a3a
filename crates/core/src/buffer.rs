use std::fmt;
use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TagBufferError;

/// Opaque project identifier.
pub type ProjectId = Uuid;

/// Opaque machine/asset identifier.
pub type AssetId = Uuid;

/// Identity of one buffered TAG file.
///
/// Equality and hashing are structural over all three fields. The file name is
/// unique within a project+asset pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferKey {
    pub project_id: ProjectId,
    pub asset_id: AssetId,
    pub file_name: String,
}

impl BufferKey {
    pub fn new(project_id: ProjectId, asset_id: AssetId, file_name: impl Into<String>) -> Self {
        Self {
            project_id,
            asset_id,
            file_name: file_name.into(),
        }
    }

    /// Parse a key from a relative path shaped `<project-uuid>/<asset-uuid>/<file>`.
    pub fn from_relative_path(path: &Path) -> Result<Self, TagBufferError> {
        let parts: Vec<&str> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();

        let [project, asset, file] = parts.as_slice() else {
            return Err(TagBufferError::InvalidPath(format!(
                "expected <project>/<asset>/<file>, got {}",
                path.display()
            )));
        };

        let project_id = Uuid::parse_str(project).map_err(|e| {
            TagBufferError::InvalidPath(format!("bad project id {project:?}: {e}"))
        })?;
        let asset_id = Uuid::parse_str(asset)
            .map_err(|e| TagBufferError::InvalidPath(format!("bad asset id {asset:?}: {e}")))?;

        Ok(Self::new(project_id, asset_id, *file))
    }
}

impl fmt::Display for BufferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project_id, self.asset_id, self.file_name)
    }
}

/// Payload held in the backing store for one [`BufferKey`].
///
/// Project and asset ids are redundant with the key; they travel with the
/// payload so downstream consumers don't need the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferItem {
    pub file_name: String,
    pub content: Vec<u8>,
    pub asset_id: AssetId,
    pub project_id: ProjectId,
    pub received_at: DateTime<Utc>,
}

impl BufferItem {
    pub fn new(key: &BufferKey, content: Vec<u8>) -> Self {
        Self {
            file_name: key.file_name.clone(),
            content,
            asset_id: key.asset_id,
            project_id: key.project_id,
            received_at: Utc::now(),
        }
    }

    /// The key this item is stored under.
    pub fn key(&self) -> BufferKey {
        BufferKey::new(self.project_id, self.asset_id, self.file_name.clone())
    }
}
