//! Ingestion worker: consumes jobs and finalizes document records.
//!
//! The worker owns QUEUED→PROCESSING→{PROCESSED,FAILED}. Every failure is
//! converted into either a terminal document state plus an acknowledgment,
//! or a silent redelivery (no acknowledgment, the visibility timeout is the
//! outer retry layer). Nothing propagates out of the consumer loop, so one
//! bad document can never stall the pipeline.
//!
//! Acknowledgment ordering is the load-bearing invariant: a job is acked
//! only after its terminal state is committed to the metadata store.

use std::sync::Arc;
use std::time::Duration;

use crate::blob::BlobStore;
use crate::cache::ResultCache;
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::metadata::{DocumentState, MetadataError, MetadataStore};
use crate::metrics::PipelineMetrics;
use crate::pipeline::extract::{extract_text, preview_of};
use crate::pipeline::types::FailureKind;
use crate::queue::{Delivery, JobMessage, QueueError, WorkQueue};
use crate::vector::{VectorIndex, VectorRecord};

/// Tuning knobs for the worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Bounded in-process attempts for the embedding call.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between embedding attempts.
    pub backoff: Duration,
    /// Character cap applied to extracted text.
    pub extract_max_chars: usize,
    /// Character cap applied to the stored preview.
    pub preview_max_chars: usize,
    /// Idle sleep between polls when the queue is empty.
    pub poll_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
            extract_max_chars: 500,
            preview_max_chars: 200,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Resolution of one delivered job.
enum Outcome {
    /// Document fully processed and committed.
    Completed,
    /// Nothing to do (duplicate delivery of a finished document, or an
    /// orphaned job); acknowledge and move on.
    Discard(&'static str),
    /// Non-retryable fault; commit FAILED, then acknowledge.
    Failed(FailureKind),
    /// Transient fault; leave unacknowledged so the queue redelivers.
    Retry(String),
}

/// Long-running consumer turning queued jobs into processed documents.
pub struct IngestionWorker {
    blob: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    queue: Arc<dyn WorkQueue>,
    index: Arc<dyn VectorIndex>,
    cache: Arc<dyn ResultCache>,
    embedder: Arc<dyn EmbeddingClient>,
    metrics: Arc<PipelineMetrics>,
    options: WorkerOptions,
}

impl IngestionWorker {
    /// Build a worker from collaborator handles.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        blob: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        queue: Arc<dyn WorkQueue>,
        index: Arc<dyn VectorIndex>,
        cache: Arc<dyn ResultCache>,
        embedder: Arc<dyn EmbeddingClient>,
        metrics: Arc<PipelineMetrics>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            blob,
            metadata,
            queue,
            index,
            cache,
            embedder,
            metrics,
            options,
        }
    }

    /// Consume jobs until the task is dropped.
    pub async fn run(&self) {
        tracing::info!("Ingestion worker started");
        loop {
            match self.run_once().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.options.poll_interval).await,
                Err(error) => {
                    tracing::error!(error = %error, "Queue pull failed");
                    tokio::time::sleep(self.options.poll_interval).await;
                }
            }
        }
    }

    /// Pull and handle at most one job. Returns whether a job was handled.
    ///
    /// Exposed so tests and callers can drive the worker deterministically.
    pub async fn run_once(&self) -> Result<bool, QueueError> {
        let Some(delivery) = self.queue.pull().await? else {
            return Ok(false);
        };
        self.handle_delivery(delivery).await;
        Ok(true)
    }

    async fn handle_delivery(&self, delivery: Delivery) {
        let document_id = delivery.job.document_id;
        tracing::info!(
            document_id = %document_id,
            attempt = delivery.attempt,
            "Processing document"
        );

        match self.process(&delivery.job).await {
            Outcome::Completed => {
                self.metrics.record_processed();
                tracing::info!(document_id = %document_id, "Document processed");
                self.acknowledge(&delivery).await;
            }
            Outcome::Discard(reason) => {
                tracing::debug!(document_id = %document_id, reason, "Job discarded");
                self.acknowledge(&delivery).await;
            }
            Outcome::Failed(kind) => {
                // Terminal state must be durable before the ack; if the
                // commit fails the job redelivers and fails again.
                match self
                    .metadata
                    .set_state(document_id, DocumentState::Failed, None, Some(kind.as_str()))
                    .await
                {
                    Ok(()) => {
                        self.metrics.record_failed();
                        tracing::warn!(
                            document_id = %document_id,
                            reason = kind.as_str(),
                            "Document failed"
                        );
                        self.acknowledge(&delivery).await;
                    }
                    Err(error) => tracing::warn!(
                        document_id = %document_id,
                        error = %error,
                        "Failed-state commit did not stick; leaving job for redelivery"
                    ),
                }
            }
            Outcome::Retry(reason) => {
                tracing::warn!(
                    document_id = %document_id,
                    attempt = delivery.attempt,
                    reason = %reason,
                    "Transient failure; leaving job for redelivery"
                );
            }
        }
    }

    async fn process(&self, job: &JobMessage) -> Outcome {
        let document_id = job.document_id;

        // Duplicate deliveries of a finished document are a no-op.
        match self.metadata.get(document_id).await {
            Ok(record) if record.state.is_terminal() => {
                return Outcome::Discard("document already in a terminal state");
            }
            Ok(_) => {}
            Err(MetadataError::NotFound(_)) => {
                // A job with no record cannot be finalized either way.
                return Outcome::Discard("no metadata record for job");
            }
            Err(error) => return Outcome::Retry(error.to_string()),
        }

        // Claim before any external call so a crash mid-processing is
        // observable as a record stuck in PROCESSING.
        if let Err(error) = self
            .metadata
            .set_state(document_id, DocumentState::Processing, None, None)
            .await
        {
            return Outcome::Retry(error.to_string());
        }

        let bytes = match self.blob.get(&document_id.to_string()).await {
            Ok(bytes) => bytes,
            Err(error) if error.is_not_found() => {
                return Outcome::Failed(FailureKind::CorruptReference);
            }
            Err(error) => return Outcome::Retry(error.to_string()),
        };

        let text = extract_text(&bytes, self.options.extract_max_chars);
        if text.trim().is_empty() {
            return Outcome::Failed(FailureKind::EmptyContent);
        }

        let vector = match self.embed_with_retry(&text).await {
            Ok(vector) => vector,
            Err(error) => {
                tracing::warn!(
                    document_id = %document_id,
                    error = %error,
                    "Embedding failed after exhausting retries"
                );
                return Outcome::Failed(FailureKind::EmbeddingFailed);
            }
        };

        let preview = preview_of(&text, self.options.preview_max_chars);
        let record = VectorRecord {
            document_id,
            vector,
            filename: job.filename.clone(),
            preview: preview.clone(),
        };
        if let Err(error) = self.index.upsert(record).await {
            return Outcome::Retry(error.to_string());
        }

        if let Err(error) = self
            .metadata
            .set_state(
                document_id,
                DocumentState::Processed,
                Some(preview.as_str()),
                None,
            )
            .await
        {
            // The vector upsert is an id-keyed overwrite; redelivery redoes
            // it harmlessly.
            return Outcome::Retry(error.to_string());
        }

        // A newly processed document can make previously-empty results
        // stale. Coarse invalidation is sufficient: entries are advisory.
        if let Err(error) = self.cache.invalidate_all().await {
            tracing::warn!(error = %error, "Cache invalidation failed");
        }

        Outcome::Completed
    }

    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        let mut delay = self.options.backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .embedder
                .generate_embeddings(vec![text.to_string()])
                .await
            {
                Ok(mut vectors) => {
                    return vectors.pop().ok_or_else(|| {
                        EmbeddingClientError::GenerationFailed(
                            "provider returned no vectors".to_string(),
                        )
                    });
                }
                Err(error) if attempt < self.options.max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.options.max_attempts,
                        error = %error,
                        "Embedding attempt failed; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn acknowledge(&self, delivery: &Delivery) {
        if let Err(error) = self.queue.ack(delivery).await {
            // The terminal state is already committed; a redelivery will be
            // discarded by the idempotency check.
            tracing::warn!(
                document_id = %delivery.job.document_id,
                error = %error,
                "Acknowledgment failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::cache::MemoryCache;
    use crate::embedding::HashedEmbedder;
    use crate::metadata::SqliteMetadataStore;
    use crate::queue::SqliteWorkQueue;
    use crate::vector::MemoryVectorIndex;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingClient for FailingEmbedder {
        async fn generate_embeddings(
            &self,
            _texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Err(EmbeddingClientError::GenerationFailed(
                "provider offline".into(),
            ))
        }
    }

    struct Harness {
        blob: Arc<MemoryBlobStore>,
        metadata: Arc<SqliteMetadataStore>,
        queue: Arc<SqliteWorkQueue>,
        index: Arc<MemoryVectorIndex>,
        cache: Arc<MemoryCache>,
        worker: IngestionWorker,
    }

    async fn harness_with_embedder(embedder: Arc<dyn EmbeddingClient>) -> Harness {
        let blob = Arc::new(MemoryBlobStore::new());
        let metadata = Arc::new(SqliteMetadataStore::connect_in_memory().await.unwrap());
        let queue = Arc::new(
            SqliteWorkQueue::connect_in_memory("document.process", Duration::ZERO)
                .await
                .unwrap(),
        );
        let index = Arc::new(MemoryVectorIndex::new());
        let cache = Arc::new(MemoryCache::new());
        let worker = IngestionWorker::new(
            blob.clone(),
            metadata.clone(),
            queue.clone(),
            index.clone(),
            cache.clone(),
            embedder,
            Arc::new(PipelineMetrics::new()),
            WorkerOptions {
                backoff: Duration::from_millis(1),
                ..WorkerOptions::default()
            },
        );
        Harness {
            blob,
            metadata,
            queue,
            index,
            cache,
            worker,
        }
    }

    async fn harness() -> Harness {
        harness_with_embedder(Arc::new(HashedEmbedder::new(8))).await
    }

    async fn seed_document(h: &Harness, body: &[u8]) -> Uuid {
        let id = Uuid::new_v4();
        h.blob.put(&id.to_string(), body).await.unwrap();
        h.metadata.create(id, "report.txt").await.unwrap();
        h.metadata
            .set_state(id, DocumentState::Queued, None, None)
            .await
            .unwrap();
        h.queue
            .publish(&JobMessage {
                document_id: id,
                filename: "report.txt".into(),
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn processes_document_to_terminal_state() {
        let h = harness().await;
        let id = seed_document(&h, "a".repeat(600).as_bytes()).await;

        assert!(h.worker.run_once().await.unwrap());

        let record = h.metadata.get(id).await.unwrap();
        assert_eq!(record.state, DocumentState::Processed);
        let preview = record.preview.expect("preview stored");
        assert_eq!(preview.chars().count(), 200);
        assert_eq!(h.index.len(), 1);
        // Terminal state was committed, so the job is gone.
        assert_eq!(h.queue.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_idempotent() {
        let h = harness().await;
        let id = seed_document(&h, b"stable contents").await;

        assert!(h.worker.run_once().await.unwrap());
        let first = h.metadata.get(id).await.unwrap();

        // Simulate at-least-once redelivery of the same job.
        h.queue
            .publish(&JobMessage {
                document_id: id,
                filename: "report.txt".into(),
            })
            .await
            .unwrap();
        assert!(h.worker.run_once().await.unwrap());

        let second = h.metadata.get(id).await.unwrap();
        assert_eq!(second.state, DocumentState::Processed);
        assert_eq!(second.preview, first.preview);
        assert_eq!(h.index.len(), 1);
        assert_eq!(h.queue.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_blob_fails_with_corrupt_reference() {
        let h = harness().await;
        let id = seed_document(&h, b"contents").await;
        h.blob.remove(&id.to_string());

        assert!(h.worker.run_once().await.unwrap());

        let record = h.metadata.get(id).await.unwrap();
        assert_eq!(record.state, DocumentState::Failed);
        assert_eq!(record.failure.as_deref(), Some("corrupt reference"));
        assert!(h.index.is_empty());
        // Acked: no infinite redelivery loop.
        assert_eq!(h.queue.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_content_fails_without_retry() {
        let h = harness().await;
        let id = seed_document(&h, b"   \n  ").await;

        assert!(h.worker.run_once().await.unwrap());

        let record = h.metadata.get(id).await.unwrap();
        assert_eq!(record.state, DocumentState::Failed);
        assert_eq!(record.failure.as_deref(), Some("empty content"));
        assert_eq!(h.queue.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn embedding_exhaustion_reaches_failed() {
        let h = harness_with_embedder(Arc::new(FailingEmbedder)).await;
        let id = seed_document(&h, b"contents").await;

        assert!(h.worker.run_once().await.unwrap());

        let record = h.metadata.get(id).await.unwrap();
        assert_eq!(record.state, DocumentState::Failed);
        assert_eq!(record.failure.as_deref(), Some("embedding error"));
        assert!(h.index.is_empty());
        assert_eq!(h.queue.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn successful_ingestion_invalidates_cache() {
        let h = harness().await;
        h.cache
            .set_with_ttl("search:old query", "[]".into(), Duration::from_secs(300))
            .await
            .unwrap();
        seed_document(&h, b"fresh contents").await;

        assert!(h.worker.run_once().await.unwrap());

        assert!(h.cache.get("search:old query").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn orphan_job_is_discarded() {
        let h = harness().await;
        // Job published with no metadata record behind it.
        h.queue
            .publish(&JobMessage {
                document_id: Uuid::new_v4(),
                filename: "ghost.txt".into(),
            })
            .await
            .unwrap();

        assert!(h.worker.run_once().await.unwrap());
        assert_eq!(h.queue.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_queue_reports_idle() {
        let h = harness().await;
        assert!(!h.worker.run_once().await.unwrap());
    }
}
