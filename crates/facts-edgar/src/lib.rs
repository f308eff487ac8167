#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/filing-facts/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! SEC EDGAR fact provider.
//!
//! # Example
//!
//! ```no_run
//! use facts_core::{FactProvider, FactRequest, FactsConfig};
//! use facts_edgar::EdgarFactsProvider;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FactsConfig::new("Research Desk research@example.com");
//!     let provider = EdgarFactsProvider::new(config)?;
//!
//!     let cutoff = chrono::NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
//!     let outcome = provider.fetch_facts(&FactRequest::new("AAPL", cutoff)).await?;
//!     for record in outcome.records() {
//!         println!("{}: {:?}", record.period_end, record.fields);
//!     }
//!
//!     Ok(())
//! }
//! ```

/// Numeric fact resolution with alias fallback.
pub mod extract;
/// Rate-limited HTTP fetching.
pub mod fetch;
/// Anchor scanning for directory listings and HTML documents.
pub mod html;
/// Company filing index.
pub mod index;
/// XBRL and inline-XBRL instance parsing.
pub mod instance;
/// Instance document location strategies.
pub mod locate;
/// Token-bucket rate limiting.
pub mod rate_limit;

mod assemble;
mod concepts;

pub use assemble::{FactAssembler, build_period_records};
pub use concepts::aliases;
pub use extract::{ConceptExtractor, ConceptMatch};
pub use fetch::{FetchClient, FetchedDocument, HttpResponse, HttpTransport, ReqwestTransport};
pub use index::{FilingIndexResolver, select_latest, select_latest_excluding, select_with_fallback};
pub use instance::{Context, FactDocument, InstanceDocument, NumericFact, Period, PeriodView};
pub use locate::{DocumentCandidate, DocumentLocator, FilingRef, LocatedDocument, SourceStrategy};
pub use rate_limit::{HostRateLimiters, LimiterSettings, RateLimiter};

use async_trait::async_trait;
use facts_core::{
    DataProvider, DocumentCache, FactProvider, FactRequest, FactsConfig, Result, TickerOutcome,
};
use std::sync::Arc;
use tracing::warn;

/// [`FactProvider`] backed by SEC EDGAR.
#[derive(Debug)]
pub struct EdgarFactsProvider {
    client: Arc<FetchClient>,
    assembler: FactAssembler,
}

impl EdgarFactsProvider {
    /// Creates a provider with its own `reqwest` transport and host limiters.
    ///
    /// # Errors
    ///
    /// Returns [`facts_core::FactsError::Configuration`] if the configuration
    /// is invalid (for example, no contact string).
    pub fn new(config: FactsConfig) -> Result<Self> {
        config.validate()?;
        let limiters = Arc::new(HostRateLimiters::from_config(&config)?);
        Self::with_transport(config, Arc::new(ReqwestTransport::new()?), limiters)
    }

    /// Creates a provider over an explicit transport and shared limiters.
    ///
    /// # Errors
    ///
    /// Returns [`facts_core::FactsError::Configuration`] if the configuration
    /// is invalid.
    pub fn with_transport(
        config: FactsConfig,
        transport: Arc<dyn HttpTransport>,
        limiters: Arc<HostRateLimiters>,
    ) -> Result<Self> {
        let client = Arc::new(FetchClient::new(&config, transport, limiters)?);
        Ok(Self::from_client(client, &config))
    }

    /// Creates a provider over an existing client.
    #[must_use]
    pub fn from_client(client: Arc<FetchClient>, config: &FactsConfig) -> Self {
        let assembler = FactAssembler::new(Arc::clone(&client), config);
        Self { client, assembler }
    }

    /// Creates a provider that serves archive documents from `cache`.
    ///
    /// # Errors
    ///
    /// Returns [`facts_core::FactsError::Configuration`] if the configuration
    /// is invalid.
    pub fn with_cache(
        config: FactsConfig,
        transport: Arc<dyn HttpTransport>,
        limiters: Arc<HostRateLimiters>,
        cache: Arc<dyn DocumentCache>,
    ) -> Result<Self> {
        let client = Arc::new(FetchClient::new(&config, transport, limiters)?.with_cache(cache));
        Ok(Self::from_client(client, &config))
    }

    /// The fetch client shared by every stage.
    #[must_use]
    pub const fn client(&self) -> &Arc<FetchClient> {
        &self.client
    }

    /// The assembler driving the pipeline.
    #[must_use]
    pub const fn assembler(&self) -> &FactAssembler {
        &self.assembler
    }
}

impl DataProvider for EdgarFactsProvider {
    fn name(&self) -> &str {
        "SEC EDGAR"
    }

    fn description(&self) -> &str {
        "Quarterly financial-statement facts from SEC EDGAR XBRL filings"
    }
}

#[async_trait]
impl FactProvider for EdgarFactsProvider {
    async fn fetch_facts(&self, request: &FactRequest) -> Result<TickerOutcome> {
        let fields = request.effective_fields();
        match self
            .assembler
            .assemble(&request.ticker, request.cutoff, &fields)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_fatal() => Err(e),
            Err(error) => {
                warn!(ticker = %request.ticker, error = %error, "Ticker failed");
                Ok(TickerOutcome::Failed { error })
            }
        }
    }
}
