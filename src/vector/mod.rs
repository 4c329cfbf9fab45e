//! Vector index abstraction and adapters.
//!
//! Entries are keyed by document id so re-processing a document overwrites
//! its vector instead of duplicating it. The payload carries enough fields
//! (filename, preview) to hydrate search results without a metadata
//! round-trip.

mod memory;
mod qdrant;

pub use memory::MemoryVectorIndex;
pub use qdrant::QdrantIndex;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned while interacting with a vector index.
#[derive(Debug, Error)]
pub enum VectorIndexError {
    /// Base URL failed to parse or normalize.
    #[error("invalid index URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("index request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend responded with an unexpected status code.
    #[error("unexpected index response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Supplied vector does not match the index dimension.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was created with.
        expected: usize,
        /// Dimension of the supplied vector.
        actual: usize,
    },
}

/// Embedding and denormalized payload for one document.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Document id; also the index key.
    pub document_id: Uuid,
    /// Fixed-dimension, cosine-comparable embedding.
    pub vector: Vec<f32>,
    /// Original filename, denormalized for hydration.
    pub filename: String,
    /// Bounded text preview, denormalized for hydration.
    pub preview: String,
}

/// Scored hit returned by a similarity query.
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// Document id of the matching entry.
    pub document_id: Uuid,
    /// Similarity score reported by the index.
    pub score: f32,
    /// Stored filename.
    pub filename: String,
    /// Stored preview.
    pub preview: String,
}

/// Upsert/query capability over fixed-dimension vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite the entry for a document.
    async fn upsert(&self, record: VectorRecord) -> Result<(), VectorIndexError>;

    /// Return up to `limit` entries ranked by similarity to `vector`.
    async fn query(&self, vector: Vec<f32>, limit: usize)
    -> Result<Vec<VectorHit>, VectorIndexError>;

    /// Whether the index currently answers requests.
    async fn healthy(&self) -> bool;
}
