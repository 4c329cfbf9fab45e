//! Durable work queue with at-least-once delivery.
//!
//! Messages are published to a topic and pulled by consumers. A pulled
//! message becomes invisible for a visibility timeout; if the consumer does
//! not acknowledge it in time the message redelivers with an incremented
//! attempt count. Consumers must therefore be idempotent, and must
//! acknowledge only after committing their terminal outcome.

mod sqlite;

pub use sqlite::SqliteWorkQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the work queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backing database rejected the operation.
    #[error("queue error: {0}")]
    Database(#[from] sqlx::Error),
    /// A job payload could not be encoded or decoded.
    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Instruction to process one document. A re-derivable pointer to the
/// metadata record; never carries raw content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    /// Document to process.
    pub document_id: Uuid,
    /// Original filename, carried for logging and payload hydration.
    pub filename: String,
}

/// One delivery of a job to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Receipt handle used to acknowledge this delivery.
    pub receipt: i64,
    /// The delivered job.
    pub job: JobMessage,
    /// Delivery attempt count, starting at 1.
    pub attempt: u32,
}

/// At-least-once durable message channel keyed by topic.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Append a job to the queue.
    async fn publish(&self, job: &JobMessage) -> Result<(), QueueError>;

    /// Claim the next visible job, if any, hiding it for the visibility
    /// timeout.
    async fn pull(&self) -> Result<Option<Delivery>, QueueError>;

    /// Acknowledge a delivery, removing the message from circulation.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Number of unacknowledged messages on the topic.
    async fn pending(&self) -> Result<u64, QueueError>;
}
