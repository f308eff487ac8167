//! Company filing index: ticker lookup, submissions history and filing
//! selection.

use chrono::NaiveDate;
use facts_core::{Cik, FactsConfig, FactsError, FilingRecord, Result, Symbol};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::fetch::FetchClient;

/// Path of the ticker table on the archive host.
const COMPANY_TICKERS_PATH: &str = "/files/company_tickers.json";

/// Retrieves a company's filing history and maps tickers to CIKs.
#[derive(Debug)]
pub struct FilingIndexResolver {
    client: Arc<FetchClient>,
    submissions_base_url: String,
    archive_base_url: String,
    tickers: OnceCell<HashMap<String, Cik>>,
}

impl FilingIndexResolver {
    /// Creates a resolver using the configured hosts.
    #[must_use]
    pub fn new(client: Arc<FetchClient>, config: &FactsConfig) -> Self {
        Self {
            client,
            submissions_base_url: config.submissions_base_url.trim_end_matches('/').to_string(),
            archive_base_url: config.archive_base_url.trim_end_matches('/').to_string(),
            tickers: OnceCell::new(),
        }
    }

    /// URL of a company's submissions index.
    #[must_use]
    pub fn submissions_url(&self, cik: Cik) -> String {
        format!(
            "{}/submissions/CIK{}.json",
            self.submissions_base_url,
            cik.padded()
        )
    }

    async fn ticker_table(&self) -> Result<&HashMap<String, Cik>> {
        self.tickers
            .get_or_try_init(|| async {
                let url = format!("{}{COMPANY_TICKERS_PATH}", self.archive_base_url);
                debug!("Fetching company tickers from SEC");
                let data: HashMap<String, CompanyTickerInfo> = self.client.get_json(&url).await?;
                Ok::<_, FactsError>(
                    data.into_values()
                        .map(|info| (info.ticker.to_uppercase(), Cik::new(info.cik_str)))
                        .collect(),
                )
            })
            .await
    }

    /// Maps a ticker to its CIK. Numeric identifiers are taken as CIKs
    /// without a lookup.
    ///
    /// # Errors
    ///
    /// - [`FactsError::InvalidParameter`] for an empty ticker
    /// - [`FactsError::SymbolNotFound`] if the ticker table has no entry
    /// - fetch errors while loading the ticker table
    #[instrument(skip(self), fields(ticker = %symbol))]
    pub async fn resolve_cik(&self, symbol: &Symbol) -> Result<Cik> {
        if symbol.as_str().is_empty() {
            return Err(FactsError::InvalidParameter("Empty ticker".to_string()));
        }
        if symbol.is_numeric() {
            return symbol.as_str().parse();
        }

        let table = self.ticker_table().await?;
        match table.get(symbol.as_str()) {
            Some(cik) => {
                debug!(cik = %cik.padded(), "Found CIK");
                Ok(*cik)
            }
            None => Err(FactsError::SymbolNotFound(symbol.to_string())),
        }
    }

    /// Fetches the recent filing history of `cik`.
    ///
    /// Entries with an unparseable filing date are skipped.
    ///
    /// # Errors
    ///
    /// Fetch errors, or [`FactsError::Parse`] if the index is malformed.
    #[instrument(skip(self), fields(cik = %cik))]
    pub async fn resolve(&self, cik: Cik) -> Result<Vec<FilingRecord>> {
        let url = self.submissions_url(cik);
        let submissions: CompanySubmissions = self.client.get_json(&url).await?;
        let records = submissions.filings.recent.into_records();
        debug!(filings = records.len(), "Resolved filing index");
        Ok(records)
    }
}

fn form_matches(form: &str, accepted: &[String]) -> bool {
    accepted.iter().any(|a| a.eq_ignore_ascii_case(form.trim()))
}

/// Latest filing of an accepted form dated on or before `cutoff`.
///
/// Ties on filing date go to the greatest accession number.
#[must_use]
pub fn select_latest<'a>(
    records: &'a [FilingRecord],
    cutoff: NaiveDate,
    accepted_forms: &[String],
) -> Option<&'a FilingRecord> {
    select_latest_excluding(records, cutoff, accepted_forms, &HashSet::new())
}

/// Like [`select_latest`], skipping accession numbers in `exclude`.
#[must_use]
pub fn select_latest_excluding<'a>(
    records: &'a [FilingRecord],
    cutoff: NaiveDate,
    accepted_forms: &[String],
    exclude: &HashSet<String>,
) -> Option<&'a FilingRecord> {
    records
        .iter()
        .filter(|r| r.filing_date <= cutoff)
        .filter(|r| form_matches(&r.form_type, accepted_forms))
        .filter(|r| !exclude.contains(&r.accession_number))
        .max_by(|a, b| {
            a.filing_date
                .cmp(&b.filing_date)
                .then_with(|| a.accession_number.cmp(&b.accession_number))
        })
}

/// Tries `primary` forms first and widens to `fallback` when none match.
#[must_use]
pub fn select_with_fallback<'a>(
    records: &'a [FilingRecord],
    cutoff: NaiveDate,
    primary: &[String],
    fallback: &[String],
    exclude: &HashSet<String>,
) -> Option<&'a FilingRecord> {
    select_latest_excluding(records, cutoff, primary, exclude)
        .or_else(|| select_latest_excluding(records, cutoff, fallback, exclude))
}

// =============================================================================
// SEC API Response Types
// =============================================================================

/// Company ticker information from SEC JSON.
#[derive(Debug, Deserialize)]
struct CompanyTickerInfo {
    /// CIK as a number (SEC returns this as an integer)
    cik_str: u64,
    /// Ticker symbol
    ticker: String,
}

/// Company submissions index.
#[derive(Debug, Deserialize)]
struct CompanySubmissions {
    filings: SubmissionFilings,
}

#[derive(Debug, Deserialize)]
struct SubmissionFilings {
    recent: RecentFilings,
}

/// The `filings.recent` block: parallel arrays, one entry per filing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentFilings {
    #[serde(default)]
    accession_number: Vec<String>,
    #[serde(default)]
    filing_date: Vec<String>,
    #[serde(default)]
    report_date: Vec<String>,
    #[serde(default)]
    form: Vec<String>,
    #[serde(default)]
    primary_document: Vec<String>,
}

impl RecentFilings {
    fn into_records(self) -> Vec<FilingRecord> {
        let len = self
            .accession_number
            .len()
            .min(self.filing_date.len())
            .min(self.form.len())
            .min(self.primary_document.len());
        if len != self.accession_number.len() {
            warn!(
                accessions = self.accession_number.len(),
                usable = len,
                "Submissions arrays have different lengths"
            );
        }

        let mut records = Vec::with_capacity(len);
        for i in 0..len {
            let Ok(filing_date) = NaiveDate::parse_from_str(&self.filing_date[i], "%Y-%m-%d")
            else {
                warn!(
                    accession = %self.accession_number[i],
                    date = %self.filing_date[i],
                    "Skipping filing with unparseable date"
                );
                continue;
            };

            let mut record = FilingRecord::new(
                self.form[i].clone(),
                filing_date,
                self.accession_number[i].clone(),
                self.primary_document[i].clone(),
            );
            if let Some(report_date) = self
                .report_date
                .get(i)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            {
                record = record.with_report_date(report_date);
            }
            records.push(record);
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn forms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    fn filing(form: &str, filed: NaiveDate, accession: &str) -> FilingRecord {
        FilingRecord::new(form, filed, accession, "doc.htm")
    }

    #[test]
    fn test_select_latest_respects_cutoff() {
        let records = vec![
            filing("10-K", date(2024, 2, 1), "0000000001-24-000001"),
            filing("10-Q", date(2024, 5, 1), "0000000001-24-000002"),
        ];
        let selected =
            select_latest(&records, date(2024, 3, 31), &forms(&["10-K", "10-Q"])).unwrap();
        assert_eq!(selected.form_type, "10-K");
    }

    #[test]
    fn test_select_latest_tie_breaks_on_accession() {
        let records = vec![
            filing("10-K", date(2024, 2, 1), "0000000001-24-000001"),
            filing("10-K", date(2024, 2, 1), "0000000001-24-000009"),
            filing("10-K", date(2023, 2, 1), "0000000001-23-000099"),
        ];
        let selected = select_latest(&records, date(2024, 12, 31), &forms(&["10-K"])).unwrap();
        assert_eq!(selected.accession_number, "0000000001-24-000009");
    }

    #[test]
    fn test_select_latest_none_when_all_after_cutoff() {
        let records = vec![filing("10-K", date(2024, 2, 1), "a")];
        assert!(select_latest(&records, date(2024, 1, 1), &forms(&["10-K"])).is_none());
        assert!(select_latest(&records, date(2024, 12, 1), &forms(&["10-Q"])).is_none());
    }

    #[test]
    fn test_select_excluding_walks_history() {
        let records = vec![
            filing("10-K", date(2024, 2, 1), "b"),
            filing("10-K", date(2023, 2, 1), "a"),
        ];
        let mut seen = HashSet::new();
        seen.insert("b".to_string());
        let selected =
            select_latest_excluding(&records, date(2024, 12, 31), &forms(&["10-K"]), &seen)
                .unwrap();
        assert_eq!(selected.accession_number, "a");
    }

    #[test]
    fn test_fallback_chain() {
        let records = vec![
            filing("10-Q", date(2024, 5, 1), "q"),
            filing("10-K", date(2025, 2, 1), "k"),
        ];
        let primary = forms(&["10-K", "20-F"]);
        let fallback = forms(&["10-Q", "6-K", "20-F", "10-K"]);
        let selected = select_with_fallback(
            &records,
            date(2024, 12, 31),
            &primary,
            &fallback,
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(selected.accession_number, "q");
    }

    #[test]
    fn test_recent_filings_into_records() {
        let json = r#"{
            "cik": "320193",
            "name": "Apple Inc.",
            "filings": {
                "recent": {
                    "accessionNumber": ["0000320193-24-000123", "0000320193-24-000069", "bad"],
                    "filingDate": ["2024-11-01", "2024-08-02", "not-a-date"],
                    "reportDate": ["2024-09-28", "", ""],
                    "form": ["10-K", "10-Q", "8-K"],
                    "primaryDocument": ["aapl-20240928.htm", "aapl-20240629.htm", "x.htm"]
                },
                "files": []
            }
        }"#;
        let submissions: CompanySubmissions = serde_json::from_str(json).unwrap();
        let records = submissions.filings.recent.into_records();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].form_type, "10-K");
        assert_eq!(records[0].filing_date, date(2024, 11, 1));
        assert_eq!(records[0].report_date, Some(date(2024, 9, 28)));
        assert_eq!(records[1].report_date, None);
        assert_eq!(records[1].primary_document, "aapl-20240629.htm");
    }
}
