//! Backing store trait and an in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tagbuffer_core::{BufferItem, BufferKey};
use tokio::sync::RwLock;

use crate::error::QueueError;

/// Key/value store that durably holds buffered TAG files.
///
/// Implementations wrap whatever cache or object store holds the bytes. `get`
/// must report an absent key as [`QueueError::NotFound`] so callers can tell a
/// lookup miss apart from a failing store.
#[async_trait]
pub trait BufferStore: Send + Sync {
    /// Fetch the payload stored under `key`.
    async fn get(&self, key: &BufferKey) -> Result<BufferItem, QueueError>;

    /// Delete `key`. Returns whether an entry existed.
    async fn remove(&self, key: &BufferKey) -> Result<bool, QueueError>;

    /// Store an item under its own key, replacing any previous entry.
    async fn put(&self, item: BufferItem) -> Result<(), QueueError>;
}

/// Process-local [`BufferStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryBufferStore {
    items: RwLock<HashMap<BufferKey, BufferItem>>,
}

impl InMemoryBufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    pub async fn contains(&self, key: &BufferKey) -> bool {
        self.items.read().await.contains_key(key)
    }

    /// Every key currently stored, for replaying into a fresh queue after a restart.
    pub async fn keys(&self) -> Vec<BufferKey> {
        self.items.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl BufferStore for InMemoryBufferStore {
    async fn get(&self, key: &BufferKey) -> Result<BufferItem, QueueError> {
        self.items
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| QueueError::NotFound(key.to_string()))
    }

    async fn remove(&self, key: &BufferKey) -> Result<bool, QueueError> {
        Ok(self.items.write().await.remove(key).is_some())
    }

    async fn put(&self, item: BufferItem) -> Result<(), QueueError> {
        self.items.write().await.insert(item.key(), item);
        Ok(())
    }
}
