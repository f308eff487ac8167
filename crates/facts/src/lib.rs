#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/filing-facts/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Batch extraction of financial-statement facts from SEC EDGAR filings.
//!
//! This crate re-exports the core types, the document caches and the EDGAR
//! provider, and provides a [`BatchRunner`] that processes many tickers
//! concurrently while sharing one set of per-host rate limiters.
//!
//! # Features
//!
//! - `cache-sqlite` - SQLite-based document caching
//!
//! # Example
//!
//! ```rust,ignore
//! use facts::{BatchRunner, CanonicalField, FactsConfig};
//! use chrono::NaiveDate;
//!
//! #[tokio::main]
//! async fn main() -> facts::Result<()> {
//!     let runner = BatchRunner::from_config(FactsConfig::from_env()?)?;
//!
//!     let cutoff = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
//!     let report = runner.run_tickers(["AAPL", "MSFT"], cutoff, &CanonicalField::Z_SCORE).await?;
//!     println!("{}", report.to_frame(&CanonicalField::Z_SCORE)?);
//!
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use facts_core::*;

// Cache implementations
#[cfg(feature = "cache-sqlite")]
pub use facts_cache::SqliteCache;
pub use facts_cache::{InMemoryCache, NoopCache};

// Provider
pub use facts_edgar::{EdgarFactsProvider, HostRateLimiters, HttpResponse, HttpTransport};

mod batch;
pub use batch::{BatchReport, BatchRunner};
