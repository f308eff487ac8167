//! Error types for fact acquisition.
//!
//! This module defines [`FactsError`], which covers every failure that can occur
//! while fetching, locating, parsing, or caching filing documents.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while acquiring filing facts.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FactsError {
    /// Required configuration is missing or invalid (e.g. no contact string).
    ///
    /// Fatal: raised before any network activity and never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The local rate limiter could not grant tokens in time.
    #[error("Rate limit exceeded: no token available after {waited:?}")]
    RateLimitExceeded {
        /// How long the caller waited before giving up.
        waited: Duration,
    },

    /// The remote host kept answering HTTP 429 until retries ran out.
    #[error("Rate limited by {url}: retry after {retry_after:?}")]
    RateLimited {
        /// The URL that was rate limited.
        url: String,
        /// The last `Retry-After` value the host sent.
        retry_after: Option<Duration>,
    },

    /// The requested URL does not exist (HTTP 404). Terminal for that URL.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Connection failures, timeouts and similar transport problems.
    #[error("Network error: {0}")]
    TransientNetwork(String),

    /// A non-success HTTP status persisted after all retries.
    #[error("HTTP {status} for {url}")]
    Http {
        /// The URL that failed.
        url: String,
        /// The final HTTP status code.
        status: u16,
    },

    /// The response had an unexpected content type or could not be read.
    #[error("Response validation failed: {0}")]
    ResponseValidation(String),

    /// Error parsing a filing index, listing or instance document.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The ticker has no CIK in the archive's ticker table.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error interacting with the document cache.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl FactsError {
    /// Returns true for failures worth retrying with backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork(_) | Self::RateLimited { .. } | Self::Http { .. }
        )
    }

    /// Returns true when a document-locating strategy should treat the error as
    /// "this candidate failed" and move on to the next strategy.
    #[must_use]
    pub const fn is_candidate_failure(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::ResponseValidation(_) | Self::Parse(_)
        )
    }

    /// Returns true for errors that must abort the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Result type alias using [`FactsError`].
pub type Result<T> = std::result::Result<T, FactsError>;
