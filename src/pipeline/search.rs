//! Query service: cache-aside similarity search.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::ResultCache;
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::metrics::PipelineMetrics;
use crate::pipeline::types::{SearchError, SearchHit};
use crate::vector::VectorIndex;

/// Resolves search requests against the cache first, the vector index on a
/// miss. Cache entries are advisory: a cache failure degrades to an index
/// query, never to an error, and the index is never skipped in favor of an
/// entry past its TTL.
pub struct QueryService {
    cache: Arc<dyn ResultCache>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingClient>,
    metrics: Arc<PipelineMetrics>,
    top_k: usize,
    ttl: Duration,
}

impl QueryService {
    /// Build a query service from collaborator handles.
    pub fn new(
        cache: Arc<dyn ResultCache>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingClient>,
        metrics: Arc<PipelineMetrics>,
        top_k: usize,
        ttl: Duration,
    ) -> Self {
        Self {
            cache,
            index,
            embedder,
            metrics,
            top_k,
            ttl,
        }
    }

    /// Return the top-K documents most similar to `query`.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return Err(SearchError::InvalidInput("query must not be empty"));
        }
        let key = cache_key(&normalized);

        match self.cache.get(&key).await {
            Ok(Some(serialized)) => match serde_json::from_str::<Vec<SearchHit>>(&serialized) {
                Ok(hits) => {
                    self.metrics.record_search(true);
                    tracing::debug!(query = %normalized, hits = hits.len(), "Cache hit");
                    return Ok(hits);
                }
                Err(error) => {
                    tracing::warn!(error = %error, "Corrupt cache entry; dropping it");
                    if let Err(error) = self.cache.invalidate(&key).await {
                        tracing::warn!(error = %error, "Cache invalidation failed");
                    }
                }
            },
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(error = %error, "Cache read failed; querying the index");
            }
        }

        let mut vectors = self
            .embedder
            .generate_embeddings(vec![normalized.clone()])
            .await?;
        let vector = vectors.pop().ok_or_else(|| {
            SearchError::Embedding(EmbeddingClientError::GenerationFailed(
                "provider returned no vectors".to_string(),
            ))
        })?;

        let mut raw = self.index.query(vector, self.top_k).await?;
        // Deterministic ordering: score descending, document id ascending.
        raw.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        raw.truncate(self.top_k);

        let hits: Vec<SearchHit> = raw
            .into_iter()
            .map(|hit| SearchHit {
                document_id: hit.document_id,
                filename: hit.filename,
                preview: hit.preview,
                score: hit.score,
            })
            .collect();

        match serde_json::to_string(&hits) {
            Ok(serialized) => {
                if let Err(error) = self.cache.set_with_ttl(&key, serialized, self.ttl).await {
                    tracing::warn!(error = %error, "Cache write failed");
                }
            }
            Err(error) => tracing::warn!(error = %error, "Failed to serialize results for cache"),
        }

        self.metrics.record_search(false);
        tracing::debug!(query = %normalized, hits = hits.len(), "Search served from index");
        Ok(hits)
    }
}

/// Normalize a query for cache keying: trim, lowercase, collapse whitespace.
fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn cache_key(normalized: &str) -> String {
    format!("search:{normalized}")
}
