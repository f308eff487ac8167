//! Core domain types for filing-fact extraction.
//!
//! - [`Symbol`] - Ticker symbol
//! - [`Cik`] - Central Index Key assigned by the archive
//! - [`ContentKind`] - Classified response content type
//! - [`FilingRecord`] - One entry of a company's filing index
//! - [`CanonicalField`] - Canonical accounting field names
//! - [`QuarterlyFactRecord`] - Facts resolved for one reporting period
//! - [`TickerOutcome`] - Per-ticker result of the pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{FactsError, Result};

/// A trading symbol/ticker.
///
/// Symbols are automatically uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, trimming and converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the symbol is a bare numeric company identifier.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Central Index Key: the archive's numeric filer identifier.
///
/// Displays unpadded (as used in archive paths); [`Cik::padded`] gives the
/// 10-digit form used by the submissions index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cik(u64);

impl Cik {
    /// Creates a CIK from its numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns the CIK zero-padded to 10 digits.
    #[must_use]
    pub fn padded(self) -> String {
        format!("{:010}", self.0)
    }
}

impl fmt::Display for Cik {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cik {
    type Err = FactsError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("CIK")
            .or_else(|| trimmed.strip_prefix("cik"))
            .unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FactsError::InvalidParameter(format!("Invalid CIK: {s}")));
        }
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|e| FactsError::InvalidParameter(format!("Invalid CIK {s}: {e}")))
    }
}

/// Classified content type of a fetched response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    /// `application/json` and friends.
    Json,
    /// `text/html`, `application/xhtml+xml`.
    Html,
    /// Any XML content type.
    Xml,
}

impl ContentKind {
    /// Classifies a raw `Content-Type` header value for the given URL.
    ///
    /// HTML wins over XML so that `application/xhtml+xml` pages are treated as
    /// HTML. URLs whose path ends in `.xml` accept any content type mentioning
    /// "xml".
    #[must_use]
    pub fn classify(content_type: &str, url: &str) -> Option<Self> {
        let ct = content_type.to_ascii_lowercase();
        let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();

        if path.ends_with(".xml") && ct.contains("xml") {
            return Some(Self::Xml);
        }
        if ct.contains("json") {
            Some(Self::Json)
        } else if ct.contains("html") {
            Some(Self::Html)
        } else if ct.contains("xml") {
            Some(Self::Xml)
        } else {
            None
        }
    }

    /// Returns a stable lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Html => "html",
            Self::Xml => "xml",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = FactsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(Self::Json),
            "html" => Ok(Self::Html),
            "xml" => Ok(Self::Xml),
            other => Err(FactsError::Parse(format!("Unknown content kind: {other}"))),
        }
    }
}

/// One entry of a company's filing index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingRecord {
    /// Form type (e.g. "10-K", "10-Q", "20-F").
    pub form_type: String,
    /// Date the filing was accepted.
    pub filing_date: NaiveDate,
    /// Accession number in dashed form (e.g. "0000320193-23-000106").
    pub accession_number: String,
    /// Primary document filename within the filing package.
    pub primary_document: String,
    /// Period of report, when the index provides it.
    pub report_date: Option<NaiveDate>,
}

impl FilingRecord {
    /// Creates a filing record with required fields.
    #[must_use]
    pub fn new(
        form_type: impl Into<String>,
        filing_date: NaiveDate,
        accession_number: impl Into<String>,
        primary_document: impl Into<String>,
    ) -> Self {
        Self {
            form_type: form_type.into(),
            filing_date,
            accession_number: accession_number.into(),
            primary_document: primary_document.into(),
            report_date: None,
        }
    }

    /// Sets the period of report.
    #[must_use]
    pub const fn with_report_date(mut self, report_date: NaiveDate) -> Self {
        self.report_date = Some(report_date);
        self
    }

    /// Accession number with dashes removed, as used in archive paths.
    #[must_use]
    pub fn accession_without_dashes(&self) -> String {
        self.accession_number.replace('-', "")
    }

    /// URL of the filing package directory (with trailing slash).
    #[must_use]
    pub fn directory_url(&self, archive_base: &str, cik: Cik) -> String {
        format!(
            "{}/Archives/edgar/data/{}/{}/",
            archive_base.trim_end_matches('/'),
            cik,
            self.accession_without_dashes()
        )
    }

    /// URL of a named document inside the filing package.
    #[must_use]
    pub fn document_url(&self, archive_base: &str, cik: Cik, filename: &str) -> String {
        format!("{}{}", self.directory_url(archive_base, cik), filename)
    }

    /// URL of the primary document.
    #[must_use]
    pub fn primary_document_url(&self, archive_base: &str, cik: Cik) -> String {
        self.document_url(archive_base, cik, &self.primary_document)
    }
}

/// Canonical accounting fields the pipeline knows how to resolve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    /// Total assets.
    TotalAssets,
    /// Current assets.
    CurrentAssets,
    /// Current liabilities.
    CurrentLiabilities,
    /// Retained earnings (accumulated deficit).
    RetainedEarnings,
    /// Earnings before interest and taxes.
    Ebit,
    /// Total revenue.
    Revenue,
    /// Total liabilities.
    TotalLiabilities,
    /// Stockholders' equity.
    StockholdersEquity,
    /// Net income (loss).
    NetIncome,
    /// Common shares outstanding.
    SharesOutstanding,
}

impl CanonicalField {
    /// Fields whose absence rejects a reporting period outright.
    pub const CRITICAL: [Self; 4] = [
        Self::TotalAssets,
        Self::CurrentAssets,
        Self::CurrentLiabilities,
        Self::RetainedEarnings,
    ];

    /// Every canonical field, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::TotalAssets,
        Self::CurrentAssets,
        Self::CurrentLiabilities,
        Self::RetainedEarnings,
        Self::Ebit,
        Self::Revenue,
        Self::TotalLiabilities,
        Self::StockholdersEquity,
        Self::NetIncome,
        Self::SharesOutstanding,
    ];

    /// Fields the Z-score collaborator consumes.
    pub const Z_SCORE: [Self; 7] = [
        Self::TotalAssets,
        Self::CurrentAssets,
        Self::CurrentLiabilities,
        Self::RetainedEarnings,
        Self::Ebit,
        Self::Revenue,
        Self::TotalLiabilities,
    ];

    /// Returns the snake_case canonical name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TotalAssets => "total_assets",
            Self::CurrentAssets => "current_assets",
            Self::CurrentLiabilities => "current_liabilities",
            Self::RetainedEarnings => "retained_earnings",
            Self::Ebit => "ebit",
            Self::Revenue => "revenue",
            Self::TotalLiabilities => "total_liabilities",
            Self::StockholdersEquity => "stockholders_equity",
            Self::NetIncome => "net_income",
            Self::SharesOutstanding => "shares_outstanding",
        }
    }

    /// Returns true for fields in [`CanonicalField::CRITICAL`].
    #[must_use]
    pub fn is_critical(&self) -> bool {
        Self::CRITICAL.contains(self)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = FactsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FactsError::InvalidParameter(format!("Unknown field: {s}")))
    }
}

/// Facts resolved for one (ticker, period end).
///
/// Missing fields are stored as `None` so downstream consumers can tell "not
/// reported" apart from zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuarterlyFactRecord {
    /// Ticker the record belongs to.
    pub ticker: Symbol,
    /// End date of the reporting period.
    pub period_end: NaiveDate,
    /// Resolved value per canonical field.
    pub fields: BTreeMap<CanonicalField, Option<f64>>,
    /// Critical fields that could not be resolved (empty for accepted records).
    pub critical_fields_missing: Vec<CanonicalField>,
    /// Accession number of the filing the facts came from.
    pub accession_number: Option<String>,
    /// Form type of the filing the facts came from.
    pub form_type: Option<String>,
}

impl QuarterlyFactRecord {
    /// Creates an empty record for a period.
    #[must_use]
    pub const fn new(ticker: Symbol, period_end: NaiveDate) -> Self {
        Self {
            ticker,
            period_end,
            fields: BTreeMap::new(),
            critical_fields_missing: Vec::new(),
            accession_number: None,
            form_type: None,
        }
    }

    /// Records the filing the facts came from.
    #[must_use]
    pub fn with_source(mut self, filing: &FilingRecord) -> Self {
        self.accession_number = Some(filing.accession_number.clone());
        self.form_type = Some(filing.form_type.clone());
        self
    }

    /// Returns the value of a field, if resolved.
    #[must_use]
    pub fn get(&self, field: CanonicalField) -> Option<f64> {
        self.fields.get(&field).copied().flatten()
    }

    /// Returns the requested fields that were not resolved.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<CanonicalField> {
        self.fields
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(field, _)| *field)
            .collect()
    }
}

/// A reporting period dropped because critical fields were unresolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedPeriod {
    /// End date of the rejected period.
    pub period_end: NaiveDate,
    /// Accession number of the filing it came from.
    pub accession_number: String,
    /// Critical fields that could not be resolved.
    pub critical_fields_missing: Vec<CanonicalField>,
}

/// Per-ticker result of the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickerOutcome {
    /// At least one period was accepted. Records are ordered oldest to newest.
    Facts {
        /// Accepted records.
        records: Vec<QuarterlyFactRecord>,
    },
    /// Filings were reachable but no period carried every critical field.
    NoUsableData {
        /// Periods that were seen and rejected.
        rejected: Vec<RejectedPeriod>,
    },
    /// The ticker could not be processed (fetch failure, unknown symbol, ...).
    Failed {
        /// The error that stopped processing.
        error: FactsError,
    },
}

impl TickerOutcome {
    /// Returns the accepted records, if any.
    #[must_use]
    pub fn records(&self) -> &[QuarterlyFactRecord] {
        match self {
            Self::Facts { records } => records,
            _ => &[],
        }
    }

    /// Returns true for the "no usable financial data" outcome.
    #[must_use]
    pub const fn is_no_usable_data(&self) -> bool {
        matches!(self, Self::NoUsableData { .. })
    }

    /// Returns true if processing failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
