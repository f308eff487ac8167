#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/filing-facts/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for filing-fact extraction.
//!
//! - [`FactProvider`](provider::FactProvider) - Per-ticker fact acquisition
//! - [`DocumentCache`](cache::DocumentCache) - Caching abstraction for archive documents
//! - [`FactsConfig`](config::FactsConfig) - Pipeline configuration
//! - [`FactsError`](error::FactsError) - Error taxonomy

/// Cache trait and types for storing fetched documents.
pub mod cache;
/// Pipeline configuration.
pub mod config;
/// Error types for fact acquisition.
pub mod error;
/// Conversion of fact records into data frames.
pub mod frame;
/// Provider traits for fetching filing facts.
pub mod provider;
/// Core domain types (Symbol, Cik, FilingRecord, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use cache::{CachedDocument, DocumentCache};
pub use config::{CONTACT_ENV_VAR, FactsConfig, RateLimitStrategy};
pub use error::{FactsError, Result};
pub use frame::records_to_frame;
pub use provider::{DataProvider, FactProvider, FactRequest};
pub use types::{
    CanonicalField, Cik, ContentKind, FilingRecord, QuarterlyFactRecord, RejectedPeriod, Symbol,
    TickerOutcome,
};
