//! No-op cache implementation.

use async_trait::async_trait;
use facts_core::{CachedDocument, DocumentCache, Result};
use std::time::Duration;
use tracing::trace;

/// A no-op cache that doesn't store anything.
///
/// `get_document` always returns `Ok(None)` and `put_document` returns `Ok(())`.
/// Useful for disabling caching or testing code paths without cache hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl NoopCache {
    /// Create a new no-op cache.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentCache for NoopCache {
    async fn get_document(&self, _url: &str) -> Result<Option<CachedDocument>> {
        trace!("NoopCache: get_document called, returning None");
        Ok(None)
    }

    async fn put_document(&self, _url: &str, _document: &CachedDocument) -> Result<()> {
        trace!("NoopCache: put_document called, doing nothing");
        Ok(())
    }

    async fn invalidate_stale(&self, _ttl: Duration) -> Result<usize> {
        Ok(0)
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}
