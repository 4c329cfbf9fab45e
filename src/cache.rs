//! Result cache with TTL expiry.
//!
//! Entries are advisory: losing them never loses correctness, only latency.
//! Values are opaque serialized strings so the cache stays ignorant of the
//! pipeline's domain types.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

/// Errors returned by cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache backend could not be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Key→value store with TTL expiry.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Fetch the value under `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key` for `ttl`.
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration)
    -> Result<(), CacheError>;

    /// Drop a single entry.
    async fn invalidate(&self, key: &str) -> Result<(), CacheError>;

    /// Drop every entry.
    async fn invalidate_all(&self) -> Result<(), CacheError>;
}

/// In-process cache backed by a concurrent map with expiry instants.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if Instant::now() < *expires_at {
                return Ok(Some(value.clone()));
            }
        }
        // Expired entries are dropped lazily on the next read.
        self.entries
            .remove_if(key, |_, (_, expires_at)| Instant::now() >= *expires_at);
        Ok(None)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_within_ttl() {
        let cache = MemoryCache::new();
        cache
            .set_with_ttl("search:q", "results".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("search:q").await.unwrap().as_deref(), Some("results"));
    }

    #[tokio::test]
    async fn expired_entries_miss() {
        let cache = MemoryCache::new();
        cache
            .set_with_ttl("search:q", "results".into(), Duration::ZERO)
            .await
            .unwrap();
        assert!(cache.get("search:q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalidate_all_clears_entries() {
        let cache = MemoryCache::new();
        cache
            .set_with_ttl("a", "1".into(), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set_with_ttl("b", "2".into(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.invalidate_all().await.unwrap();
        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalidate_drops_single_entry() {
        let cache = MemoryCache::new();
        cache
            .set_with_ttl("a", "1".into(), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set_with_ttl("b", "2".into(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.invalidate("a").await.unwrap();
        assert!(cache.get("a").await.unwrap().is_none());
        assert_eq!(cache.get("b").await.unwrap().as_deref(), Some("2"));
    }
}
