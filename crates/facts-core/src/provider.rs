//! Provider traits for fetching filing facts.
//!
//! - [`DataProvider`] - Base trait with provider metadata
//! - [`FactProvider`] - Per-ticker quarterly fact acquisition

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::{
    error::Result,
    types::{CanonicalField, Symbol, TickerOutcome},
};

/// Base trait for all data providers.
pub trait DataProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "SEC EDGAR").
    fn name(&self) -> &str;

    /// Returns a description of this provider.
    fn description(&self) -> &str;
}

/// One ticker's extraction request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactRequest {
    /// Ticker or bare numeric CIK.
    pub ticker: Symbol,
    /// Filings dated after this are ignored.
    pub cutoff: NaiveDate,
    /// Fields to resolve. Critical fields are always added.
    pub required_fields: Vec<CanonicalField>,
}

impl FactRequest {
    /// Creates a request for the Z-score field set.
    #[must_use]
    pub fn new(ticker: impl Into<Symbol>, cutoff: NaiveDate) -> Self {
        Self {
            ticker: ticker.into(),
            cutoff,
            required_fields: CanonicalField::Z_SCORE.to_vec(),
        }
    }

    /// Replaces the required field list.
    #[must_use]
    pub fn with_fields(mut self, fields: &[CanonicalField]) -> Self {
        self.required_fields = fields.to_vec();
        self
    }

    /// Required fields unioned with the critical fields, deduplicated and in
    /// canonical order.
    #[must_use]
    pub fn effective_fields(&self) -> Vec<CanonicalField> {
        let mut fields: Vec<CanonicalField> = CanonicalField::CRITICAL
            .iter()
            .chain(self.required_fields.iter())
            .copied()
            .collect();
        fields.sort();
        fields.dedup();
        fields
    }
}

/// Provider of per-quarter filing facts.
///
/// Per-ticker problems (unknown symbol, unreachable filings, no usable data)
/// are reported inside [`TickerOutcome`]; only errors that must stop a whole
/// batch, such as missing configuration, are returned as `Err`.
#[async_trait]
pub trait FactProvider: DataProvider {
    /// Resolves the requested fields for the newest reporting periods of one ticker.
    async fn fetch_facts(&self, request: &FactRequest) -> Result<TickerOutcome>;
}
