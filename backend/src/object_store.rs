//! Object store abstraction.
//!
//! The backend treats its storage tier as a plain key/value object store
//! with list-by-prefix. Durability is the store's problem; the only
//! property relied on here is that `list` returns keys in lexicographic
//! order, which the expiration sweeper uses to walk markers oldest-first.
//! No compare-and-swap is offered: every state mutation is a full
//! read-modify-write, and concurrent mutations to the same record can
//! lose an update (accepted, documented limitation).

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

/// Object store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store failure: {0}")]
    Backend(String),

    #[error("corrupt record at {key}: {detail}")]
    CorruptRecord { key: String, detail: String },
}

/// Minimal key/value object store surface.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;

    /// Deleting a missing key is a no-op.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// All keys under `prefix`, lexicographically sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// In-memory object store backed by a concurrent map.
///
/// The production deployment points at a real object store; this
/// implementation serves development and the test suite.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects (test helper).
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.objects.get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.objects.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let store = MemoryObjectStore::new();
        store.put("a/b", vec![1, 2]).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Some(vec![1, 2]));

        // Overwrite is idempotent replacement.
        store.put("a/b", vec![3]).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Some(vec![3]));

        store.delete("a/b").await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), None);

        // Deleting again is a no-op.
        store.delete("a/b").await.unwrap();
    }

    #[tokio::test]
    async fn list_is_prefix_filtered_and_sorted() {
        let store = MemoryObjectStore::new();
        for key in ["x/2", "x/1", "y/1", "x/10"] {
            store.put(key, vec![]).await.unwrap();
        }
        let keys = store.list("x/").await.unwrap();
        assert_eq!(keys, vec!["x/1", "x/10", "x/2"]);
    }
}
