//! Durable document records and processing state.
//!
//! The metadata store is the single source of truth for a document's
//! lifecycle. The vector index and the result cache are derived projections
//! that can always be rebuilt from it. States only ever move forward:
//!
//! ```text
//! uploaded → queued → processing → processed
//!                                → failed
//! ```

mod sqlite;

pub use sqlite::SqliteMetadataStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the metadata store.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// No record exists for the requested document id.
    #[error("document not found: {0}")]
    NotFound(Uuid),
    /// The backing database rejected the operation.
    #[error("metadata store error: {0}")]
    Database(#[from] sqlx::Error),
    /// A stored value could not be decoded into its domain type.
    #[error("invalid stored record: {0}")]
    Invalid(String),
}

/// Lifecycle state of a document moving through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentState {
    /// Blob and record persisted; job not yet confirmed on the queue.
    Uploaded,
    /// Processing job confirmed on the work queue.
    Queued,
    /// A worker has claimed the job and is running extraction.
    Processing,
    /// Terminal: vector upserted and preview stored.
    Processed,
    /// Terminal: processing gave up; see the failure reason.
    Failed,
}

impl DocumentState {
    /// Stable lowercase name used in storage and listings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    /// Whether the state is terminal (no further transitions).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "uploaded" => Some(Self::Uploaded),
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "processed" => Some(Self::Processed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Durable record describing one uploaded document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    /// Opaque unique id generated at intake.
    pub id: Uuid,
    /// Original filename supplied by the uploader.
    pub filename: String,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// Current lifecycle state.
    pub state: DocumentState,
    /// Bounded text preview, set only on successful processing.
    pub preview: Option<String>,
    /// Failure reason, set only on terminal failure.
    pub failure: Option<String>,
}

/// Durable relational store of document identity and processing state.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Create a record in the `uploaded` state.
    async fn create(&self, id: Uuid, filename: &str) -> Result<(), MetadataError>;

    /// Fetch the record for a document id.
    async fn get(&self, id: Uuid) -> Result<DocumentRecord, MetadataError>;

    /// Advance a document's state, optionally storing a preview or failure
    /// reason. Writes are monotonic: an attempt to move a record backwards
    /// (or to leave a terminal state) is a no-op, never an error, so
    /// redelivered jobs converge without coordination.
    async fn set_state(
        &self,
        id: Uuid,
        state: DocumentState,
        preview: Option<&str>,
        failure: Option<&str>,
    ) -> Result<(), MetadataError>;

    /// List records ordered by recency, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<DocumentRecord>, MetadataError>;

    /// List records stuck in the given state for longer than `older_than`.
    async fn list_stalled(
        &self,
        state: DocumentState,
        older_than: Duration,
    ) -> Result<Vec<DocumentRecord>, MetadataError>;

    /// Cheap liveness probe for health reporting.
    async fn ping(&self) -> Result<(), MetadataError>;
}

/// Current timestamp at whole-second precision, so stored values compare
/// lexicographically in chronological order.
pub(crate) fn now_rfc3339() -> String {
    format_rfc3339(time::OffsetDateTime::now_utc())
}

pub(crate) fn format_rfc3339(moment: time::OffsetDateTime) -> String {
    moment
        .replace_nanosecond(0)
        .unwrap_or(moment)
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names_round_trip() {
        for state in [
            DocumentState::Uploaded,
            DocumentState::Queued,
            DocumentState::Processing,
            DocumentState::Processed,
            DocumentState::Failed,
        ] {
            assert_eq!(DocumentState::parse(state.as_str()), Some(state));
        }
        assert_eq!(DocumentState::parse("bogus"), None);
    }

    #[test]
    fn only_final_states_are_terminal() {
        assert!(DocumentState::Processed.is_terminal());
        assert!(DocumentState::Failed.is_terminal());
        assert!(!DocumentState::Processing.is_terminal());
        assert!(!DocumentState::Queued.is_terminal());
    }
}
