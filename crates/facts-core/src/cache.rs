//! Cache trait for storing fetched archive documents.
//!
//! This module defines the [`DocumentCache`] trait. Filing-package documents
//! never change once published, so a cache hit lets the fetch layer skip both
//! the network and the rate limiter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{error::Result, types::ContentKind};

/// A cached response body with its classified content kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedDocument {
    /// Response body.
    pub body: String,
    /// Classified content kind of the response.
    pub kind: ContentKind,
}

impl CachedDocument {
    /// Creates a cached document.
    #[must_use]
    pub fn new(body: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            body: body.into(),
            kind,
        }
    }
}

/// Trait for caching fetched documents by URL.
///
/// Implementations can store data in various backends (SQLite, in-memory, etc.)
/// to avoid repeated requests against a rate-limited host.
#[async_trait]
pub trait DocumentCache: Send + Sync {
    /// Retrieves a cached document.
    ///
    /// Returns `Ok(Some(doc))` if cached, `Ok(None)` if not cached.
    async fn get_document(&self, url: &str) -> Result<Option<CachedDocument>>;

    /// Stores a document in the cache, replacing any previous entry.
    async fn put_document(&self, url: &str, document: &CachedDocument) -> Result<()>;

    /// Removes cache entries older than the specified TTL.
    ///
    /// Returns the number of entries invalidated.
    async fn invalidate_stale(&self, ttl: Duration) -> Result<usize>;

    /// Clears all cached data.
    async fn clear(&self) -> Result<()>;
}
