//! Per-ticker assembly of quarterly fact records.
//!
//! The assembler walks a company's filing history newest first, locates the
//! instance document of each filing and turns every reporting period in it
//! into a [`QuarterlyFactRecord`]. Periods missing a critical field are
//! rejected.

use chrono::NaiveDate;
use facts_core::{
    CanonicalField, Cik, FactsConfig, FactsError, FilingRecord, QuarterlyFactRecord,
    RejectedPeriod, Result, Symbol, TickerOutcome,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::concepts;
use crate::extract::ConceptExtractor;
use crate::fetch::FetchClient;
use crate::index::{FilingIndexResolver, select_latest_excluding, select_with_fallback};
use crate::instance::InstanceDocument;
use crate::locate::{DocumentLocator, FilingRef};

/// Verdict for one period of one filing.
#[derive(Debug, Clone)]
enum PeriodVerdict {
    Accepted(QuarterlyFactRecord),
    Rejected(RejectedPeriod),
}

impl PeriodVerdict {
    const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

#[derive(Debug, Clone)]
struct PeriodEntry {
    filed: NaiveDate,
    accession: String,
    verdict: PeriodVerdict,
}

impl PeriodEntry {
    /// Accepted beats rejected; otherwise the newer filing wins.
    fn supersedes(&self, other: &Self) -> bool {
        match (self.verdict.is_accepted(), other.verdict.is_accepted()) {
            (true, false) => true,
            (false, true) => false,
            _ => (self.filed, &self.accession) > (other.filed, &other.accession),
        }
    }
}

/// Turns one parsed instance into per-period verdicts.
///
/// Critical fields are always evaluated, whether or not `fields` lists them.
#[must_use]
pub fn build_period_records(
    ticker: &Symbol,
    filing: &FilingRecord,
    document: &InstanceDocument,
    fields: &[CanonicalField],
) -> Vec<(QuarterlyFactRecord, bool)> {
    let extractor = ConceptExtractor::new();
    let mut wanted: Vec<CanonicalField> = CanonicalField::CRITICAL
        .iter()
        .chain(fields)
        .copied()
        .collect();
    wanted.sort();
    wanted.dedup();

    document
        .reporting_periods()
        .into_iter()
        .map(|period_end| {
            let mut record = QuarterlyFactRecord::new(ticker.clone(), period_end).with_source(filing);
            for field in &wanted {
                let value =
                    extractor.extract_for_period(document, concepts::aliases(*field), period_end);
                record.fields.insert(*field, value);
            }
            record.critical_fields_missing = record
                .missing_fields()
                .into_iter()
                .filter(CanonicalField::is_critical)
                .collect();
            let accepted = record.critical_fields_missing.is_empty();
            (record, accepted)
        })
        .collect()
}

/// Walks filing history and assembles per-period records for one ticker.
#[derive(Debug)]
pub struct FactAssembler {
    index: FilingIndexResolver,
    locator: DocumentLocator,
    archive_base_url: String,
    primary_forms: Vec<String>,
    fallback_forms: Vec<String>,
    walk_forms: Vec<String>,
    periods_to_retain: usize,
    max_filings: usize,
}

/// What became of one filing.
enum FilingYield {
    Periods(Vec<PeriodEntry>),
    Unresolved,
    FetchFailed(FactsError),
}

impl FactAssembler {
    /// Creates an assembler sharing `client` for every request.
    #[must_use]
    pub fn new(client: Arc<FetchClient>, config: &FactsConfig) -> Self {
        Self {
            index: FilingIndexResolver::new(Arc::clone(&client), config),
            locator: DocumentLocator::new(client),
            archive_base_url: config.archive_base_url.trim_end_matches('/').to_string(),
            primary_forms: config.primary_forms.clone(),
            fallback_forms: config.fallback_forms.clone(),
            walk_forms: walk_forms(&config.primary_forms, &config.fallback_forms),
            periods_to_retain: config.periods_to_retain,
            max_filings: config.max_filings,
        }
    }

    /// Filing index resolver used by this assembler.
    #[must_use]
    pub const fn index(&self) -> &FilingIndexResolver {
        &self.index
    }

    /// Assembles at most `periods_to_retain` accepted periods for `ticker`
    /// from filings dated on or before `cutoff`, ordered oldest to newest.
    ///
    /// Zero accepted periods give [`TickerOutcome::NoUsableData`], or
    /// [`TickerOutcome::Failed`] when every attempted filing failed to fetch.
    ///
    /// # Errors
    ///
    /// Returns an error if the CIK or filing index cannot be resolved, or on
    /// a fatal configuration error.
    #[instrument(skip(self, fields), fields(ticker = %ticker, cutoff = %cutoff))]
    pub async fn assemble(
        &self,
        ticker: &Symbol,
        cutoff: NaiveDate,
        fields: &[CanonicalField],
    ) -> Result<TickerOutcome> {
        let cik = self.index.resolve_cik(ticker).await?;
        let filings = self.index.resolve(cik).await?;

        let mut periods: BTreeMap<NaiveDate, PeriodEntry> = BTreeMap::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut attempted = 0usize;
        let mut fetch_failures = 0usize;
        let mut last_error = None;

        while attempted < self.max_filings {
            // The fallback chain picks the first filing; the walk then moves
            // newest first across every accepted form.
            let next = if seen.is_empty() {
                select_with_fallback(
                    &filings,
                    cutoff,
                    &self.primary_forms,
                    &self.fallback_forms,
                    &seen,
                )
            } else {
                select_latest_excluding(&filings, cutoff, &self.walk_forms, &seen)
            };
            let Some(filing) = next else {
                debug!(attempted, "Filing history exhausted");
                break;
            };
            if let Some(floor) = retained_floor(&periods, self.periods_to_retain)
                && filing.filing_date <= floor
            {
                debug!(attempted, %floor, "Enough periods retained");
                break;
            }
            seen.insert(filing.accession_number.clone());
            attempted += 1;

            match self.process_filing(ticker, cik, filing, fields).await? {
                FilingYield::Periods(entries) => {
                    for entry in entries {
                        let period_end = entry_period(&entry);
                        match periods.get(&period_end) {
                            Some(existing) if !entry.supersedes(existing) => {}
                            _ => {
                                periods.insert(period_end, entry);
                            }
                        }
                    }
                }
                FilingYield::Unresolved => {}
                FilingYield::FetchFailed(e) => {
                    fetch_failures += 1;
                    last_error = Some(e);
                }
            }
        }

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for entry in periods.into_values() {
            match entry.verdict {
                PeriodVerdict::Accepted(record) => accepted.push(record),
                PeriodVerdict::Rejected(period) => rejected.push(period),
            }
        }

        if accepted.is_empty() {
            if attempted > 0
                && fetch_failures == attempted
                && let Some(error) = last_error
            {
                warn!(attempted, error = %error, "Every filing failed to fetch");
                return Ok(TickerOutcome::Failed { error });
            }
            info!(attempted, rejected = rejected.len(), "No usable financial data");
            return Ok(TickerOutcome::NoUsableData { rejected });
        }

        // BTreeMap order is oldest first; keep the newest N.
        let skip = accepted.len().saturating_sub(self.periods_to_retain);
        let records: Vec<QuarterlyFactRecord> = accepted.into_iter().skip(skip).collect();
        info!(
            attempted,
            periods = records.len(),
            rejected = rejected.len(),
            "Assembled fact records"
        );
        Ok(TickerOutcome::Facts { records })
    }

    /// Locates, parses and extracts one filing. Only fatal errors escape.
    async fn process_filing(
        &self,
        ticker: &Symbol,
        cik: Cik,
        filing: &FilingRecord,
        fields: &[CanonicalField],
    ) -> Result<FilingYield> {
        let directory_url = filing.directory_url(&self.archive_base_url, cik);
        let filing_ref = FilingRef {
            cik,
            accession_number: &filing.accession_number,
            primary_document: &filing.primary_document,
            directory_url: &directory_url,
        };

        let located = match self.locator.locate(filing_ref).await {
            Ok(Some(located)) => located,
            Ok(None) => {
                info!(accession = %filing.accession_number, form = %filing.form_type, "Filing unresolved");
                return Ok(FilingYield::Unresolved);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(accession = %filing.accession_number, error = %e, "Filing fetch failed");
                return Ok(FilingYield::FetchFailed(e));
            }
        };

        debug!(
            accession = %filing.accession_number,
            source = %located.source,
            url = %located.url,
            "Extracting facts"
        );

        let entries = build_period_records(ticker, filing, &located.document, fields)
            .into_iter()
            .map(|(record, accepted)| {
                let verdict = if accepted {
                    PeriodVerdict::Accepted(record)
                } else {
                    debug!(
                        period = %record.period_end,
                        missing = ?record.critical_fields_missing,
                        "Rejecting period"
                    );
                    PeriodVerdict::Rejected(RejectedPeriod {
                        period_end: record.period_end,
                        accession_number: filing.accession_number.clone(),
                        critical_fields_missing: record.critical_fields_missing,
                    })
                };
                PeriodEntry {
                    filed: filing.filing_date,
                    accession: filing.accession_number.clone(),
                    verdict,
                }
            })
            .collect();
        Ok(FilingYield::Periods(entries))
    }
}

fn entry_period(entry: &PeriodEntry) -> NaiveDate {
    match &entry.verdict {
        PeriodVerdict::Accepted(record) => record.period_end,
        PeriodVerdict::Rejected(period) => period.period_end,
    }
}

/// Union of both form lists, case-insensitively deduplicated, primary first.
fn walk_forms(primary: &[String], fallback: &[String]) -> Vec<String> {
    let mut forms: Vec<String> = Vec::new();
    for form in primary.iter().chain(fallback) {
        if !forms.iter().any(|f| f.eq_ignore_ascii_case(form)) {
            forms.push(form.clone());
        }
    }
    forms
}

/// Period end of the `n`-th newest accepted period, once `n` are held.
///
/// A filing dated on or before it cannot report a newer period, so the walk
/// may stop there.
fn retained_floor(periods: &BTreeMap<NaiveDate, PeriodEntry>, n: usize) -> Option<NaiveDate> {
    if n == 0 {
        return None;
    }
    periods
        .iter()
        .rev()
        .filter(|(_, entry)| entry.verdict.is_accepted())
        .nth(n - 1)
        .map(|(period_end, _)| *period_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const INSTANCE: &str = r#"<xbrl xmlns:xbrli="x" xmlns:us-gaap="y">
  <xbrli:context id="c24"><xbrli:period><xbrli:instant>2024-03-31</xbrli:instant></xbrli:period></xbrli:context>
  <xbrli:context id="c23"><xbrli:period><xbrli:instant>2023-12-31</xbrli:instant></xbrli:period></xbrli:context>
  <us-gaap:Assets contextRef="c24" unitRef="usd">1000</us-gaap:Assets>
  <us-gaap:AssetsCurrent contextRef="c24" unitRef="usd">400</us-gaap:AssetsCurrent>
  <us-gaap:LiabilitiesCurrent contextRef="c24" unitRef="usd">300</us-gaap:LiabilitiesCurrent>
  <us-gaap:RetainedEarningsAccumulatedDeficit contextRef="c24" unitRef="usd">50</us-gaap:RetainedEarningsAccumulatedDeficit>
  <us-gaap:AssetsCurrent contextRef="c23" unitRef="usd">380</us-gaap:AssetsCurrent>
  <us-gaap:LiabilitiesCurrent contextRef="c23" unitRef="usd">290</us-gaap:LiabilitiesCurrent>
  <us-gaap:RetainedEarningsAccumulatedDeficit contextRef="c23" unitRef="usd">45</us-gaap:RetainedEarningsAccumulatedDeficit>
</xbrl>"#;

    fn entry(filed: NaiveDate, accession: &str, accepted: bool) -> PeriodEntry {
        let period = date(2024, 3, 31);
        let verdict = if accepted {
            PeriodVerdict::Accepted(QuarterlyFactRecord::new(Symbol::new("X"), period))
        } else {
            PeriodVerdict::Rejected(RejectedPeriod {
                period_end: period,
                accession_number: accession.to_string(),
                critical_fields_missing: vec![CanonicalField::TotalAssets],
            })
        };
        PeriodEntry {
            filed,
            accession: accession.to_string(),
            verdict,
        }
    }

    #[test]
    fn test_period_missing_total_assets_is_rejected() {
        let document = InstanceDocument::parse(INSTANCE).unwrap();
        let filing = FilingRecord::new("10-Q", date(2024, 5, 1), "0000000001-24-000002", "x.xml");
        let results = build_period_records(
            &Symbol::new("X"),
            &filing,
            &document,
            &[CanonicalField::Revenue],
        );

        assert_eq!(results.len(), 2);
        let (newest, newest_ok) = &results[0];
        assert_eq!(newest.period_end, date(2024, 3, 31));
        assert!(newest_ok);
        assert_relative_eq!(newest.get(CanonicalField::TotalAssets).unwrap(), 1000.0);
        // Revenue is missing but not critical.
        assert_eq!(newest.get(CanonicalField::Revenue), None);
        assert_eq!(newest.missing_fields(), vec![CanonicalField::Revenue]);
        assert_eq!(newest.accession_number.as_deref(), Some("0000000001-24-000002"));

        let (older, older_ok) = &results[1];
        assert_eq!(older.period_end, date(2023, 12, 31));
        assert!(!older_ok);
        assert_eq!(older.critical_fields_missing, vec![CanonicalField::TotalAssets]);
    }

    #[test]
    fn test_newer_filing_supersedes() {
        let old = entry(date(2024, 5, 1), "a", true);
        let new = entry(date(2024, 8, 1), "b", true);
        assert!(new.supersedes(&old));
        assert!(!old.supersedes(&new));
    }

    #[test]
    fn test_retained_floor_is_nth_newest_accepted_period() {
        let mut periods = BTreeMap::new();
        periods.insert(date(2023, 9, 30), entry(date(2023, 11, 1), "a", true));
        periods.insert(date(2023, 12, 31), entry(date(2024, 2, 15), "b", true));
        periods.insert(date(2024, 3, 31), entry(date(2024, 5, 1), "c", false));

        assert_eq!(retained_floor(&periods, 1), Some(date(2023, 12, 31)));
        assert_eq!(retained_floor(&periods, 2), Some(date(2023, 9, 30)));
        assert_eq!(retained_floor(&periods, 3), None);
        assert_eq!(retained_floor(&periods, 0), None);
    }

    #[test]
    fn test_walk_forms_union_keeps_primary_first() {
        let primary = vec!["10-K".to_string(), "20-F".to_string()];
        let fallback: Vec<String> = ["10-Q", "6-K", "20-f", "10-K"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(walk_forms(&primary, &fallback), vec!["10-K", "20-F", "10-Q", "6-K"]);
    }

    #[test]
    fn test_accepted_beats_rejected() {
        let rejected_newer = entry(date(2024, 8, 1), "b", false);
        let accepted_older = entry(date(2024, 5, 1), "a", true);
        assert!(accepted_older.supersedes(&rejected_newer));
        assert!(!rejected_newer.supersedes(&accepted_older));
    }
}
