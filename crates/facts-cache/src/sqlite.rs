//! SQLite-based cache implementation.

use async_trait::async_trait;
use chrono::Utc;
use facts_core::{CachedDocument, ContentKind, DocumentCache, FactsError, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, instrument};

/// SQLite-based document cache.
///
/// Stores documents in a SQLite database file so repeated runs do not re-fetch
/// filing packages. `cached_at` is kept as Unix milliseconds.
#[derive(Debug)]
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Create a new SQLite cache at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| FactsError::Cache(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory SQLite cache.
    ///
    /// Useful for testing; data is lost when the cache is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| FactsError::Cache(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let cache = Self {
            conn: Mutex::new(conn),
        };
        cache.initialize_schema()?;
        Ok(cache)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FactsError::Cache(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS document_cache (
                url TEXT PRIMARY KEY NOT NULL,
                kind TEXT NOT NULL,
                body TEXT NOT NULL,
                cached_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| FactsError::Cache(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_document_cached_at
             ON document_cache(cached_at)",
            [],
        )
        .map_err(|e| FactsError::Cache(e.to_string()))?;

        debug!("SQLite cache schema initialized");
        Ok(())
    }
}

#[async_trait]
impl DocumentCache for SqliteCache {
    #[instrument(skip(self))]
    async fn get_document(&self, url: &str) -> Result<Option<CachedDocument>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FactsError::Cache(e.to_string()))?;

        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT kind, body FROM document_cache WHERE url = ?1",
                params![url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| FactsError::Cache(e.to_string()))?;

        match row {
            Some((kind, body)) => {
                debug!("Cache hit");
                let kind: ContentKind = kind.parse()?;
                Ok(Some(CachedDocument { body, kind }))
            }
            None => {
                debug!("Cache miss");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, document), fields(kind = %document.kind, bytes = document.body.len()))]
    async fn put_document(&self, url: &str, document: &CachedDocument) -> Result<()> {
        let cached_at = Utc::now().timestamp_millis();
        let conn = self
            .conn
            .lock()
            .map_err(|e| FactsError::Cache(e.to_string()))?;

        conn.execute(
            "INSERT OR REPLACE INTO document_cache (url, kind, body, cached_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![url, document.kind.as_str(), document.body, cached_at],
        )
        .map_err(|e| FactsError::Cache(e.to_string()))?;

        debug!("Cached document");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn invalidate_stale(&self, ttl: Duration) -> Result<usize> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| FactsError::Cache(format!("Invalid TTL duration: {e}")))?;
        let cutoff = (Utc::now() - ttl).timestamp_millis();

        let conn = self
            .conn
            .lock()
            .map_err(|e| FactsError::Cache(e.to_string()))?;

        let deleted = conn
            .execute(
                "DELETE FROM document_cache WHERE cached_at < ?1",
                params![cutoff],
            )
            .map_err(|e| FactsError::Cache(e.to_string()))?;

        if deleted > 0 {
            debug!("Invalidated {} stale cache entries", deleted);
        }
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FactsError::Cache(e.to_string()))?;

        conn.execute("DELETE FROM document_cache", [])
            .map_err(|e| FactsError::Cache(e.to_string()))?;

        debug!("Cleared all cache entries");
        Ok(())
    }
}
