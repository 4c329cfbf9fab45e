use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_submitted: AtomicU64,
    documents_processed: AtomicU64,
    documents_failed: AtomicU64,
    searches_served: AtomicU64,
    cache_hits: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document accepted by the intake coordinator.
    pub fn record_submitted(&self) {
        self.documents_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a document that reached its terminal PROCESSED state.
    pub fn record_processed(&self) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a document that reached its terminal FAILED state.
    pub fn record_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed search, noting whether the cache served it.
    pub fn record_search(&self, cache_hit: bool) {
        self.searches_served.fetch_add(1, Ordering::Relaxed);
        if cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_submitted: self.documents_submitted.load(Ordering::Relaxed),
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            searches_served: self.searches_served.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents accepted by intake since startup.
    pub documents_submitted: u64,
    /// Documents that completed processing.
    pub documents_processed: u64,
    /// Documents that terminally failed.
    pub documents_failed: u64,
    /// Searches answered, from cache or the index.
    pub searches_served: u64,
    /// Searches answered from the cache.
    pub cache_hits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_pipeline_counters() {
        let metrics = PipelineMetrics::new();
        metrics.record_submitted();
        metrics.record_processed();
        metrics.record_failed();
        metrics.record_search(true);
        metrics.record_search(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_submitted, 1);
        assert_eq!(snapshot.documents_processed, 1);
        assert_eq!(snapshot.documents_failed, 1);
        assert_eq!(snapshot.searches_served, 2);
        assert_eq!(snapshot.cache_hits, 1);
    }

    #[test]
    fn snapshot_starts_empty() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.snapshot().documents_submitted, 0);
        assert_eq!(metrics.snapshot().searches_served, 0);
    }
}
