//! End-to-end pipeline tests over in-memory collaborators.
//!
//! The SQLite-backed metadata store and work queue run on private in-memory
//! databases; blob storage, the vector index, and the cache use the
//! in-process adapters. The worker is driven deterministically through
//! `run_once` instead of a background task.

use std::sync::Arc;
use std::time::Duration;

use docpipe::blob::{BlobStore, MemoryBlobStore};
use docpipe::cache::MemoryCache;
use docpipe::embedding::HashedEmbedder;
use docpipe::metadata::{DocumentState, MetadataStore, SqliteMetadataStore};
use docpipe::metrics::PipelineMetrics;
use docpipe::pipeline::{IngestionWorker, IntakeCoordinator, QueryService, WorkerOptions};
use docpipe::queue::{JobMessage, SqliteWorkQueue, WorkQueue};
use docpipe::vector::MemoryVectorIndex;

struct Pipeline {
    blob: Arc<MemoryBlobStore>,
    metadata: Arc<SqliteMetadataStore>,
    queue: Arc<SqliteWorkQueue>,
    index: Arc<MemoryVectorIndex>,
    intake: IntakeCoordinator,
    worker: IngestionWorker,
    query: QueryService,
}

async fn pipeline() -> Pipeline {
    let blob = Arc::new(MemoryBlobStore::new());
    let metadata = Arc::new(SqliteMetadataStore::connect_in_memory().await.unwrap());
    let queue = Arc::new(
        SqliteWorkQueue::connect_in_memory("document.process", Duration::ZERO)
            .await
            .unwrap(),
    );
    let index = Arc::new(MemoryVectorIndex::new());
    let cache = Arc::new(MemoryCache::new());
    let embedder = Arc::new(HashedEmbedder::new(32));
    let metrics = Arc::new(PipelineMetrics::new());

    let intake = IntakeCoordinator::new(
        blob.clone(),
        metadata.clone(),
        queue.clone(),
        metrics.clone(),
    );
    let worker = IngestionWorker::new(
        blob.clone(),
        metadata.clone(),
        queue.clone(),
        index.clone(),
        cache.clone(),
        embedder.clone(),
        metrics.clone(),
        WorkerOptions {
            backoff: Duration::from_millis(1),
            ..WorkerOptions::default()
        },
    );
    let query = QueryService::new(
        cache,
        index.clone(),
        embedder,
        metrics,
        3,
        Duration::from_secs(300),
    );

    Pipeline {
        blob,
        metadata,
        queue,
        index,
        intake,
        worker,
        query,
    }
}

#[tokio::test]
async fn six_hundred_char_document_end_to_end() {
    let p = pipeline().await;
    let body = "sustainability disclosure ".repeat(24); // 624 chars
    assert!(body.len() > 500);

    let id = p.intake.submit("disclosure.txt", body.as_bytes()).await.unwrap();
    assert_eq!(p.metadata.get(id).await.unwrap().state, DocumentState::Queued);

    assert!(p.worker.run_once().await.unwrap());

    let record = p.metadata.get(id).await.unwrap();
    assert_eq!(record.state, DocumentState::Processed);
    let preview = record.preview.expect("preview stored");
    assert!(preview.chars().count() <= 200);

    let listing = p.metadata.list_recent(10).await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].state, DocumentState::Processed);

    let hits = p.query.search("sustainability disclosure").await.unwrap();
    assert!(!hits.is_empty() && hits.len() <= 3);
    assert_eq!(hits[0].document_id, id);
    assert!((0.0..=1.0).contains(&hits[0].score));
}

#[tokio::test]
async fn redelivered_job_for_processed_document_is_a_no_op() {
    let p = pipeline().await;
    let id = p.intake.submit("report.txt", b"quarterly report body").await.unwrap();
    assert!(p.worker.run_once().await.unwrap());

    let before = p.metadata.get(id).await.unwrap();
    assert_eq!(p.index.len(), 1);

    // At-least-once delivery: the same job arrives again.
    p.queue
        .publish(&JobMessage {
            document_id: id,
            filename: "report.txt".into(),
        })
        .await
        .unwrap();
    assert!(p.worker.run_once().await.unwrap());

    let after = p.metadata.get(id).await.unwrap();
    assert_eq!(after.state, DocumentState::Processed);
    assert_eq!(after.preview, before.preview);
    assert_eq!(p.index.len(), 1);
    assert_eq!(p.queue.pending().await.unwrap(), 0);
}

#[tokio::test]
async fn observed_states_never_regress() {
    let p = pipeline().await;
    let id = p.intake.submit("report.txt", b"body").await.unwrap();

    let order = [
        DocumentState::Uploaded,
        DocumentState::Queued,
        DocumentState::Processing,
        DocumentState::Processed,
    ];
    let rank = |state: DocumentState| order.iter().position(|s| *s == state).unwrap();

    let mut last = rank(p.metadata.get(id).await.unwrap().state);
    assert!(p.worker.run_once().await.unwrap());
    let next = rank(p.metadata.get(id).await.unwrap().state);
    assert!(next >= last);
    last = next;

    // Redelivery cannot move the record backwards either.
    p.queue
        .publish(&JobMessage {
            document_id: id,
            filename: "report.txt".into(),
        })
        .await
        .unwrap();
    assert!(p.worker.run_once().await.unwrap());
    assert!(rank(p.metadata.get(id).await.unwrap().state) >= last);
}

#[tokio::test]
async fn blob_deleted_before_processing_reaches_failed() {
    let p = pipeline().await;
    let id = p.intake.submit("doomed.txt", b"short lived").await.unwrap();
    p.blob.remove(&id.to_string());

    assert!(p.worker.run_once().await.unwrap());

    let record = p.metadata.get(id).await.unwrap();
    assert_eq!(record.state, DocumentState::Failed);
    assert_eq!(record.failure.as_deref(), Some("corrupt reference"));
    // The job was acknowledged: no redelivery loop.
    assert_eq!(p.queue.pending().await.unwrap(), 0);
    assert!(p.worker.run_once().await.is_ok_and(|handled| !handled));

    // Failed documents stay visible in listings.
    let listing = p.metadata.list_recent(10).await.unwrap();
    assert_eq!(listing[0].state, DocumentState::Failed);
}

#[tokio::test]
async fn completed_ingestion_invalidates_stale_results() {
    let p = pipeline().await;

    // Cache a miss for a query that has no matching documents yet.
    let empty = p.query.search("emissions baseline").await.unwrap();
    assert!(empty.is_empty());

    let id = p.intake.submit("baseline.txt", b"emissions baseline study").await.unwrap();
    assert!(p.worker.run_once().await.unwrap());

    // The cached empty result must not survive the ingestion.
    let refreshed = p.query.search("emissions baseline").await.unwrap();
    assert_eq!(refreshed.len(), 1);
    assert_eq!(refreshed[0].document_id, id);
}

#[tokio::test]
async fn repeated_searches_are_deterministic() {
    let p = pipeline().await;
    for name in ["alpha.txt", "beta.txt", "gamma.txt", "delta.txt"] {
        let body = format!("{name} shared vocabulary body");
        p.intake.submit(name, body.as_bytes()).await.unwrap();
        assert!(p.worker.run_once().await.unwrap());
    }

    let first = p.query.search("shared vocabulary").await.unwrap();
    assert_eq!(first.len(), 3);
    for _ in 0..3 {
        let again = p.query.search("shared vocabulary").await.unwrap();
        assert_eq!(again, first);
    }

    let mut ranked = first.clone();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap()
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    assert_eq!(ranked, first);
}

#[tokio::test]
async fn submitted_blob_matches_uploaded_bytes() {
    let p = pipeline().await;
    let id = p.intake.submit("bytes.bin", &[0x66, 0x6f, 0xff]).await.unwrap();
    assert_eq!(p.blob.get(&id.to_string()).await.unwrap(), vec![0x66, 0x6f, 0xff]);
}
