//! Error taxonomy and result types for the pipeline surface.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::blob::BlobError;
use crate::embedding::EmbeddingClientError;
use crate::metadata::MetadataError;
use crate::vector::VectorIndexError;

/// Errors surfaced synchronously by document submission.
///
/// Storage variants are transient and safe to retry at the caller;
/// `InvalidInput` is a caller error and is not.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Filename or content failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Blob storage rejected the write; no partial state remains visible.
    #[error("storage unavailable: {0}")]
    Blob(#[from] BlobError),
    /// Metadata store rejected the write; no job was enqueued.
    #[error("storage unavailable: {0}")]
    Metadata(#[from] MetadataError),
}

/// Errors surfaced synchronously by search.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Query string failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Query embedding could not be produced.
    #[error("search unavailable: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector index rejected the query; no stale-cache fallback is attempted.
    #[error("search unavailable: {0}")]
    Index(#[from] VectorIndexError),
}

/// Terminal failure reasons recorded on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The blob vanished after the metadata record was committed.
    CorruptReference,
    /// Extraction produced no usable text.
    EmptyContent,
    /// The embedding provider failed after exhausting retries.
    EmbeddingFailed,
}

impl FailureKind {
    /// Stable reason string stored on the document record.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CorruptReference => "corrupt reference",
            Self::EmptyContent => "empty content",
            Self::EmbeddingFailed => "embedding error",
        }
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Matching document id.
    pub document_id: Uuid,
    /// Original filename from the vector payload.
    pub filename: String,
    /// Bounded text preview from the vector payload.
    pub preview: String,
    /// Cosine similarity score.
    pub score: f32,
}
