//! In-memory cache implementation.

use async_trait::async_trait;
use chrono::Utc;
use facts_core::{CachedDocument, DocumentCache, Result};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Cache entry with timestamp for TTL-based invalidation.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    cached_at: chrono::DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.cached_at);
        age > chrono::TimeDelta::from_std(ttl).unwrap_or(chrono::TimeDelta::MAX)
    }
}

/// In-memory document cache keyed by URL.
///
/// Entries live in a `RwLock`-protected `HashMap` and are lost when the cache
/// is dropped. Bodies are cloned on get/put.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    documents: RwLock<HashMap<String, CacheEntry<CachedDocument>>>,
}

impl InMemoryCache {
    /// Create a new empty in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Returns true if nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentCache for InMemoryCache {
    #[instrument(skip(self))]
    async fn get_document(&self, url: &str) -> Result<Option<CachedDocument>> {
        let cache = self.documents.read().await;
        match cache.get(url) {
            Some(entry) => {
                debug!("Cache hit");
                Ok(Some(entry.data.clone()))
            }
            None => {
                debug!("Cache miss");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, document), fields(kind = %document.kind, bytes = document.body.len()))]
    async fn put_document(&self, url: &str, document: &CachedDocument) -> Result<()> {
        let mut cache = self.documents.write().await;
        cache.insert(url.to_string(), CacheEntry::new(document.clone()));
        debug!("Cached document");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn invalidate_stale(&self, ttl: Duration) -> Result<usize> {
        let mut cache = self.documents.write().await;
        let before = cache.len();
        cache.retain(|_, entry| !entry.is_stale(ttl));
        let removed = before - cache.len();

        if removed > 0 {
            debug!("Invalidated {} stale cache entries", removed);
        }
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        self.documents.write().await.clear();
        debug!("Cleared all cache entries");
        Ok(())
    }
}
