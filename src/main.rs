use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use docpipe::api::{self, AppState};
use docpipe::blob::{BlobStore, S3BlobStore, S3Settings};
use docpipe::cache::MemoryCache;
use docpipe::config;
use docpipe::embedding::HashedEmbedder;
use docpipe::logging;
use docpipe::metadata::SqliteMetadataStore;
use docpipe::metrics::PipelineMetrics;
use docpipe::pipeline::{IngestionWorker, IntakeCoordinator, QueryService, WorkerOptions};
use docpipe::queue::SqliteWorkQueue;
use docpipe::vector::QdrantIndex;

/// Topic carrying document processing jobs.
const PROCESS_TOPIC: &str = "document.process";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    let blob: Arc<dyn BlobStore> = Arc::new(
        S3BlobStore::new(S3Settings {
            endpoint: config.aws_endpoint.clone(),
            bucket: config.aws_bucket.clone(),
            region: config.aws_region.clone(),
            access_key_id: config.aws_access_key_id.clone(),
            secret_access_key: config.aws_secret_access_key.clone(),
            prefix: "documents".to_string(),
        })
        .context("Failed to build blob store client")?,
    );
    let metadata = Arc::new(
        SqliteMetadataStore::connect(&config.database_url)
            .await
            .context("Failed to open metadata store")?,
    );
    let queue = Arc::new(
        SqliteWorkQueue::connect(&config.database_url, PROCESS_TOPIC, config.queue_visibility)
            .await
            .context("Failed to open work queue")?,
    );
    let index = Arc::new(
        QdrantIndex::new(
            &config.qdrant_url,
            config.qdrant_api_key.clone(),
            config.qdrant_collection_name.as_str(),
            config.embedding_dimension,
        )
        .context("Failed to build vector index client")?,
    );
    index
        .ensure_collection()
        .await
        .context("Failed to ensure vector collection")?;
    let cache = Arc::new(MemoryCache::new());
    let embedder = Arc::new(HashedEmbedder::new(config.embedding_dimension));
    let metrics = Arc::new(PipelineMetrics::new());

    let intake = Arc::new(IntakeCoordinator::new(
        blob.clone(),
        metadata.clone(),
        queue.clone(),
        metrics.clone(),
    ));
    let query = Arc::new(QueryService::new(
        cache.clone(),
        index.clone(),
        embedder.clone(),
        metrics.clone(),
        config.search_top_k,
        config.cache_ttl,
    ));
    let worker = Arc::new(IngestionWorker::new(
        blob,
        metadata.clone(),
        queue.clone(),
        index.clone(),
        cache,
        embedder,
        metrics.clone(),
        WorkerOptions {
            max_attempts: config.worker_max_attempts,
            backoff: config.worker_backoff,
            extract_max_chars: config.extract_max_chars,
            preview_max_chars: config.preview_max_chars,
            ..WorkerOptions::default()
        },
    ));

    tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });

    tokio::spawn({
        let intake = intake.clone();
        let grace = config.sweep_grace;
        let interval = config.sweep_interval;
        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match intake.requeue_stalled(grace).await {
                    Ok(0) => {}
                    Ok(requeued) => tracing::info!(requeued, "Recovery sweep re-queued documents"),
                    Err(error) => tracing::warn!(error = %error, "Recovery sweep failed"),
                }
            }
        }
    });

    let app = api::create_router(Arc::new(AppState {
        intake,
        query,
        metadata,
        queue,
        index,
        metrics,
    }));

    let (listener, port) = bind_listener().await.context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .await
        .context("Server terminated")?;
    Ok(())
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 8080..=8099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 8080-8099",
    ))
}
