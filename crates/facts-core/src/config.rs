//! Pipeline configuration.
//!
//! [`FactsConfig`] carries every tunable of the pipeline. It deserializes from
//! any `serde` format, can be built with `with_*` methods, and reads the
//! mandatory contact string from `EDGAR_CONTACT` via [`FactsConfig::from_env`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{FactsError, Result};

/// Environment variable holding the `User-Agent` contact string.
pub const CONTACT_ENV_VAR: &str = "EDGAR_CONTACT";

/// What a rate limiter does when not enough tokens are available.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStrategy {
    /// Sleep and poll until tokens exist or the acquire timeout elapses.
    #[default]
    Wait,
    /// Fail immediately.
    FailFast,
    /// Make a single attempt and fail if tokens are short.
    TryOnce,
}

/// Configuration for the filing-fact pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactsConfig {
    /// Self-identifying contact sent as `User-Agent` (e.g. "Acme Research ops@acme.com").
    pub contact: String,
    /// Token refill rate per host.
    pub requests_per_second: f64,
    /// Token bucket capacity per host.
    pub bucket_capacity: f64,
    /// Minimum spacing between grants on one host, in milliseconds (0 disables).
    pub min_request_interval_ms: u64,
    /// Maximum physical attempts per request.
    pub max_retries: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on waiting for a rate-limit token, in milliseconds.
    pub acquire_timeout_ms: u64,
    /// Per-request HTTP timeout, in seconds.
    pub request_timeout_secs: u64,
    /// Behaviour when the token bucket is empty.
    pub rate_limit_strategy: RateLimitStrategy,
    /// Maximum tickers processed concurrently by the batch runner.
    pub max_concurrent: usize,
    /// Form types tried first when selecting a filing.
    pub primary_forms: Vec<String>,
    /// Form types tried when no primary form matches.
    pub fallback_forms: Vec<String>,
    /// Number of newest accepted periods kept per ticker.
    pub periods_to_retain: usize,
    /// Maximum filings processed per ticker.
    pub max_filings: usize,
    /// Base URL of the submissions index host.
    pub submissions_base_url: String,
    /// Base URL of the filing archive host.
    pub archive_base_url: String,
    /// Cache immutable archive documents in memory.
    pub cache_documents: bool,
}

impl Default for FactsConfig {
    fn default() -> Self {
        Self {
            contact: String::new(),
            requests_per_second: 10.0,
            bucket_capacity: 10.0,
            min_request_interval_ms: 0,
            max_retries: 3,
            base_delay_ms: 1000,
            acquire_timeout_ms: 30_000,
            request_timeout_secs: 30,
            rate_limit_strategy: RateLimitStrategy::Wait,
            max_concurrent: 4,
            primary_forms: vec!["10-K".to_string(), "20-F".to_string()],
            fallback_forms: vec![
                "10-Q".to_string(),
                "6-K".to_string(),
                "20-F".to_string(),
                "10-K".to_string(),
            ],
            periods_to_retain: 12,
            max_filings: 8,
            submissions_base_url: "https://data.sec.gov".to_string(),
            archive_base_url: "https://www.sec.gov".to_string(),
            cache_documents: false,
        }
    }
}

impl FactsConfig {
    /// Creates a default configuration with the given contact string.
    #[must_use]
    pub fn new(contact: impl Into<String>) -> Self {
        Self {
            contact: contact.into(),
            ..Self::default()
        }
    }

    /// Builds a configuration from defaults plus `EDGAR_CONTACT`.
    ///
    /// # Errors
    ///
    /// Returns [`FactsError::Configuration`] if the variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        let contact = std::env::var(CONTACT_ENV_VAR).map_err(|_| {
            FactsError::Configuration(format!("{CONTACT_ENV_VAR} is not set"))
        })?;
        let config = Self::new(contact);
        config.validate()?;
        Ok(config)
    }

    /// Sets the contact string.
    #[must_use]
    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = contact.into();
        self
    }

    /// Sets the per-host refill rate and bucket capacity.
    #[must_use]
    pub const fn with_rate_limit(mut self, requests_per_second: f64, capacity: f64) -> Self {
        self.requests_per_second = requests_per_second;
        self.bucket_capacity = capacity;
        self
    }

    /// Sets the minimum interval between grants on one host.
    #[must_use]
    pub const fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the maximum number of physical attempts per request.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the backoff base delay.
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Sets the rate-limit acquire timeout.
    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the per-request HTTP timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the rate-limit strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: RateLimitStrategy) -> Self {
        self.rate_limit_strategy = strategy;
        self
    }

    /// Sets the batch concurrency bound.
    #[must_use]
    pub const fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Sets the primary and fallback form lists.
    #[must_use]
    pub fn with_forms(mut self, primary: &[&str], fallback: &[&str]) -> Self {
        self.primary_forms = primary.iter().map(|f| (*f).to_string()).collect();
        self.fallback_forms = fallback.iter().map(|f| (*f).to_string()).collect();
        self
    }

    /// Sets how many accepted periods are kept per ticker.
    #[must_use]
    pub const fn with_periods_to_retain(mut self, periods: usize) -> Self {
        self.periods_to_retain = periods;
        self
    }

    /// Sets how many filings are walked per ticker.
    #[must_use]
    pub const fn with_max_filings(mut self, max_filings: usize) -> Self {
        self.max_filings = max_filings;
        self
    }

    /// Points both hosts at other base URLs.
    #[must_use]
    pub fn with_base_urls(
        mut self,
        submissions_base_url: impl Into<String>,
        archive_base_url: impl Into<String>,
    ) -> Self {
        self.submissions_base_url = submissions_base_url.into();
        self.archive_base_url = archive_base_url.into();
        self
    }

    /// Enables or disables in-memory document caching.
    #[must_use]
    pub const fn with_document_cache(mut self, enabled: bool) -> Self {
        self.cache_documents = enabled;
        self
    }

    /// Minimum spacing between grants, if any.
    #[must_use]
    pub const fn min_request_interval(&self) -> Option<Duration> {
        if self.min_request_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.min_request_interval_ms))
        }
    }

    /// Backoff base delay.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Rate-limit acquire timeout.
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Per-request HTTP timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Checks the configuration for values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`FactsError::Configuration`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.contact.trim().is_empty() {
            return Err(FactsError::Configuration(format!(
                "a contact string is required for the User-Agent header (set {CONTACT_ENV_VAR})"
            )));
        }
        if !(self.requests_per_second.is_finite() && self.requests_per_second > 0.0) {
            return Err(FactsError::Configuration(format!(
                "requests_per_second must be positive, got {}",
                self.requests_per_second
            )));
        }
        if !(self.bucket_capacity.is_finite() && self.bucket_capacity >= 1.0) {
            return Err(FactsError::Configuration(format!(
                "bucket_capacity must be at least 1, got {}",
                self.bucket_capacity
            )));
        }
        if self.max_retries == 0 {
            return Err(FactsError::Configuration(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(FactsError::Configuration(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.periods_to_retain == 0 || self.max_filings == 0 {
            return Err(FactsError::Configuration(
                "periods_to_retain and max_filings must be at least 1".to_string(),
            ));
        }
        if self.primary_forms.is_empty() && self.fallback_forms.is_empty() {
            return Err(FactsError::Configuration(
                "at least one form type is required".to_string(),
            ));
        }
        Ok(())
    }
}
