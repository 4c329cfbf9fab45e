//! In-memory [`BlobStore`] used by tests and local development.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{BlobError, BlobStore};

/// Blob store backed by a process-local map.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a blob out from under the pipeline, simulating external loss.
    pub fn remove(&self, key: &str) {
        self.blobs.write().expect("blob map poisoned").remove(key);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        self.blobs
            .write()
            .expect("blob map poisoned")
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        self.blobs
            .read()
            .expect("blob map poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryBlobStore::new();
        store.put("doc-1", b"contents").await.unwrap();
        assert_eq!(store.get("doc-1").await.unwrap(), b"contents");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = MemoryBlobStore::new();
        let err = store.get("absent").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
