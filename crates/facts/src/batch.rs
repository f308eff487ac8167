//! Concurrent per-ticker processing with failure isolation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use facts_cache::InMemoryCache;
use facts_core::{
    CanonicalField, DataProvider, FactProvider, FactRequest, FactsConfig, FactsError, QuarterlyFactRecord,
    Result, Symbol, TickerOutcome, records_to_frame,
};
use facts_edgar::{EdgarFactsProvider, HostRateLimiters, HttpTransport, ReqwestTransport};

/// Outcome of every ticker in a batch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    outcomes: BTreeMap<Symbol, TickerOutcome>,
}

impl BatchReport {
    /// Number of tickers in the report.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true if no ticker was processed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Outcome for one ticker.
    #[must_use]
    pub fn get(&self, ticker: &Symbol) -> Option<&TickerOutcome> {
        self.outcomes.get(ticker)
    }

    /// Outcomes in ticker order.
    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &TickerOutcome)> {
        self.outcomes.iter()
    }

    /// Tickers whose processing failed.
    #[must_use]
    pub fn failed(&self) -> Vec<&Symbol> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_failed())
            .map(|(ticker, _)| ticker)
            .collect()
    }

    /// Tickers with reachable filings but no usable period.
    #[must_use]
    pub fn no_usable_data(&self) -> Vec<&Symbol> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_no_usable_data())
            .map(|(ticker, _)| ticker)
            .collect()
    }

    /// Every accepted record, grouped by ticker and ordered oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<&QuarterlyFactRecord> {
        self.outcomes
            .values()
            .flat_map(TickerOutcome::records)
            .collect()
    }

    /// All accepted records as one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be built.
    pub fn to_frame(&self, fields: &[CanonicalField]) -> Result<DataFrame> {
        let records: Vec<QuarterlyFactRecord> = self.records().into_iter().cloned().collect();
        records_to_frame(&records, fields)
    }

    fn insert(&mut self, ticker: Symbol, outcome: TickerOutcome) {
        self.outcomes.insert(ticker, outcome);
    }
}

/// Runs a [`FactProvider`] over many tickers with bounded concurrency.
///
/// One ticker's failure, including a panic inside its task, is reported as
/// [`TickerOutcome::Failed`] for that ticker and never stops the others.
/// Configuration errors abort the whole batch.
pub struct BatchRunner {
    provider: Arc<dyn FactProvider>,
    max_concurrent: usize,
}

impl std::fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner")
            .field("provider", &self.provider.name())
            .field("max_concurrent", &self.max_concurrent)
            .finish()
    }
}

impl BatchRunner {
    /// Creates a runner around any provider.
    #[must_use]
    pub fn new(provider: Arc<dyn FactProvider>, max_concurrent: usize) -> Self {
        Self {
            provider,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Builds the EDGAR pipeline from configuration, with an in-memory
    /// document cache when `cache_documents` is set.
    ///
    /// # Errors
    ///
    /// Returns [`FactsError::Configuration`] if the configuration is invalid.
    pub fn from_config(config: FactsConfig) -> Result<Self> {
        config.validate()?;
        Self::with_transport(config, Arc::new(ReqwestTransport::new()?))
    }

    /// Like [`BatchRunner::from_config`] over an explicit transport.
    ///
    /// # Errors
    ///
    /// Returns [`FactsError::Configuration`] if the configuration is invalid.
    pub fn with_transport(config: FactsConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let limiters = Arc::new(HostRateLimiters::from_config(&config)?);
        let max_concurrent = config.max_concurrent;

        let provider = if config.cache_documents {
            debug!("Document cache enabled");
            EdgarFactsProvider::with_cache(
                config,
                transport,
                limiters,
                Arc::new(InMemoryCache::new()),
            )?
        } else {
            EdgarFactsProvider::with_transport(config, transport, limiters)?
        };

        Ok(Self::new(Arc::new(provider), max_concurrent))
    }

    /// Maximum tickers in flight at once.
    #[must_use]
    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Processes `tickers` with the same cutoff and field list.
    ///
    /// # Errors
    ///
    /// See [`BatchRunner::run`].
    pub async fn run_tickers<I, S>(
        &self,
        tickers: I,
        cutoff: NaiveDate,
        fields: &[CanonicalField],
    ) -> Result<BatchReport>
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let requests = tickers
            .into_iter()
            .map(|ticker| FactRequest::new(ticker, cutoff).with_fields(fields))
            .collect();
        self.run(requests).await
    }

    /// Processes every request and returns one outcome per ticker.
    ///
    /// # Errors
    ///
    /// Returns the first fatal (configuration) error; remaining tasks are
    /// aborted.
    #[instrument(skip(self, requests), fields(tickers = requests.len(), max_concurrent = self.max_concurrent))]
    pub async fn run(&self, requests: Vec<FactRequest>) -> Result<BatchReport> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        let mut tickers = HashMap::new();

        for request in requests {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            let ticker = request.ticker.clone();
            let handle = tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| FactsError::Other(format!("Semaphore closed: {e}")))?;
                debug!(ticker = %request.ticker, "Processing ticker");
                provider.fetch_facts(&request).await
            });
            tickers.insert(handle.id(), ticker);
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (ticker, result) = match joined {
                Ok((id, result)) => (tickers.remove(&id), result),
                Err(e) => {
                    let ticker = tickers.remove(&e.id());
                    warn!(ticker = ?ticker, error = %e, "Ticker task panicked");
                    (ticker, Err(FactsError::Other(format!("task failed: {e}"))))
                }
            };
            let Some(ticker) = ticker else {
                continue;
            };

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal() => {
                    tasks.abort_all();
                    return Err(e);
                }
                Err(error) => TickerOutcome::Failed { error },
            };
            report.insert(ticker, outcome);
        }

        info!(
            tickers = report.len(),
            failed = report.failed().len(),
            no_usable_data = report.no_usable_data().len(),
            "Batch complete"
        );
        Ok(report)
    }
}
