//! Intake coordinator: accepts documents and enqueues processing jobs.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::blob::BlobStore;
use crate::metadata::{DocumentState, MetadataStore};
use crate::metrics::PipelineMetrics;
use crate::pipeline::types::SubmitError;
use crate::queue::{JobMessage, WorkQueue};

/// Accepts a document, persists blob and metadata, and enqueues a job.
///
/// Owns the UPLOADED→QUEUED transition. The blob is written before the
/// metadata record so a record can never point at a missing blob; a queue
/// publish failure after the record is committed is deliberately swallowed
/// (the document stays UPLOADED for [`IntakeCoordinator::requeue_stalled`]).
pub struct IntakeCoordinator {
    blob: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    queue: Arc<dyn WorkQueue>,
    metrics: Arc<PipelineMetrics>,
}

impl IntakeCoordinator {
    /// Build a coordinator from collaborator handles.
    pub fn new(
        blob: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        queue: Arc<dyn WorkQueue>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            blob,
            metadata,
            queue,
            metrics,
        }
    }

    /// Accept a document for asynchronous processing, returning its id.
    pub async fn submit(&self, filename: &str, content: &[u8]) -> Result<Uuid, SubmitError> {
        if filename.trim().is_empty() {
            return Err(SubmitError::InvalidInput("filename must not be empty"));
        }
        if content.is_empty() {
            return Err(SubmitError::InvalidInput("content must not be empty"));
        }

        let document_id = Uuid::new_v4();

        // Blob first: the record is only created once its blob exists.
        self.blob.put(&document_id.to_string(), content).await?;
        self.metadata.create(document_id, filename).await?;

        let job = JobMessage {
            document_id,
            filename: filename.to_string(),
        };
        match self.queue.publish(&job).await {
            Ok(()) => self.mark_queued(document_id).await,
            Err(error) => {
                tracing::warn!(
                    document_id = %document_id,
                    error = %error,
                    "Queue publish failed; document left uploaded for the recovery sweep"
                );
            }
        }

        self.metrics.record_submitted();
        tracing::info!(document_id = %document_id, filename, "Document submitted");
        Ok(document_id)
    }

    /// Re-enqueue documents stuck in UPLOADED for longer than `grace`.
    ///
    /// Covers the publish-failed path above. Returns the number of documents
    /// put back on the queue.
    pub async fn requeue_stalled(&self, grace: Duration) -> Result<usize, SubmitError> {
        let stalled = self
            .metadata
            .list_stalled(DocumentState::Uploaded, grace)
            .await?;

        let mut requeued = 0;
        for record in stalled {
            let job = JobMessage {
                document_id: record.id,
                filename: record.filename.clone(),
            };
            match self.queue.publish(&job).await {
                Ok(()) => {
                    self.mark_queued(record.id).await;
                    requeued += 1;
                    tracing::info!(document_id = %record.id, "Stalled document re-queued");
                }
                Err(error) => {
                    tracing::warn!(
                        document_id = %record.id,
                        error = %error,
                        "Re-queue attempt failed; will retry on the next sweep"
                    );
                }
            }
        }
        Ok(requeued)
    }

    /// Record the confirmed publish. A failure here is bookkeeping only;
    /// the job is on the queue and the sweep tolerates re-publishing.
    async fn mark_queued(&self, document_id: Uuid) {
        if let Err(error) = self
            .metadata
            .set_state(document_id, DocumentState::Queued, None, None)
            .await
        {
            tracing::warn!(
                document_id = %document_id,
                error = %error,
                "Failed to mark document queued"
            );
        }
    }
}
