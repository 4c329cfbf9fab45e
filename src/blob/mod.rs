//! Content storage for raw uploaded documents.
//!
//! The pipeline never inspects blob contents beyond the ingestion worker's
//! bounded extraction, so the store is a narrow capability: put bytes under a
//! key, get them back, and distinguish a missing key from a transient outage.
//! The distinction matters to the worker: a vanished blob is a data
//! integrity fault (terminal), while an outage is retryable.

mod memory;
mod s3;

pub use memory::MemoryBlobStore;
pub use s3::{S3BlobStore, S3Settings};

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by blob storage backends.
#[derive(Debug, Error)]
pub enum BlobError {
    /// No blob exists under the requested key.
    #[error("blob not found: {0}")]
    NotFound(String),
    /// HTTP layer failed before receiving a response.
    #[error("blob request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend responded with an unexpected status code.
    #[error("unexpected blob store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the backend.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

impl BlobError {
    /// Whether the error indicates a missing blob rather than an outage.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Content-addressed binary storage for raw uploaded files.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under the given key, overwriting any existing blob.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError>;

    /// Fetch the bytes stored under the given key.
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;
}
