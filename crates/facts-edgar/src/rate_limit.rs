//! Token-bucket rate limiting per target host.
//!
//! Every physical request acquires one token from the limiter of its URL host.
//! Limiters are created once per host and shared by all tasks, so the request
//! rate holds across a whole batch.

use facts_core::{FactsConfig, FactsError, RateLimitStrategy, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

/// Slack for float drift when a sleep lands exactly on the refill point.
const TOKEN_EPSILON: f64 = 1e-9;

/// Mutable bucket state, only touched under the limiter's lock.
#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_update: Instant,
    last_grant: Option<Instant>,
}

impl BucketState {
    fn refill(&mut self, now: Instant, capacity: f64, refill_rate: f64) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;
    }
}

/// Settings shared by every limiter of a [`HostRateLimiters`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterSettings {
    /// Tokens added per second.
    pub refill_rate: f64,
    /// Maximum tokens held.
    pub capacity: f64,
    /// Minimum spacing between grants.
    pub min_interval: Option<Duration>,
    /// Behaviour when tokens are short.
    pub strategy: RateLimitStrategy,
}

impl LimiterSettings {
    /// Reads limiter settings from the pipeline configuration.
    #[must_use]
    pub const fn from_config(config: &FactsConfig) -> Self {
        Self {
            refill_rate: config.requests_per_second,
            capacity: config.bucket_capacity,
            min_interval: config.min_request_interval(),
            strategy: config.rate_limit_strategy,
        }
    }
}

/// Token-bucket limiter for a single host.
///
/// The bucket starts full. Tokens refill continuously at `refill_rate` per
/// second up to `capacity`; every read and write of the bucket happens inside
/// one critical section.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_rate: f64,
    min_interval: Option<Duration>,
    strategy: RateLimitStrategy,
}

impl RateLimiter {
    /// Creates a full bucket.
    ///
    /// # Errors
    ///
    /// Returns [`FactsError::InvalidParameter`] if the rate or capacity is not
    /// positive.
    pub fn new(refill_rate: f64, capacity: f64, strategy: RateLimitStrategy) -> Result<Self> {
        if !(refill_rate.is_finite() && refill_rate > 0.0) {
            return Err(FactsError::InvalidParameter(format!(
                "refill rate must be positive, got {refill_rate}"
            )));
        }
        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(FactsError::InvalidParameter(format!(
                "capacity must be positive, got {capacity}"
            )));
        }

        Ok(Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_update: Instant::now(),
                last_grant: None,
            }),
            capacity,
            refill_rate,
            min_interval: None,
            strategy,
        })
    }

    /// Creates a limiter from shared settings.
    ///
    /// # Errors
    ///
    /// See [`RateLimiter::new`].
    pub fn from_settings(settings: LimiterSettings) -> Result<Self> {
        Ok(Self::new(settings.refill_rate, settings.capacity, settings.strategy)?
            .with_min_interval(settings.min_interval))
    }

    /// Sets a minimum spacing between grants.
    #[must_use]
    pub const fn with_min_interval(mut self, min_interval: Option<Duration>) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Bucket capacity.
    #[must_use]
    pub const fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens added per second.
    #[must_use]
    pub const fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Strategy applied when tokens are short.
    #[must_use]
    pub const fn strategy(&self) -> RateLimitStrategy {
        self.strategy
    }

    /// Refills the bucket and returns the tokens currently available.
    pub async fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock().await;
        state.refill(Instant::now(), self.capacity, self.refill_rate);
        state.tokens
    }

    /// Takes `tokens` if possible; otherwise returns how long until it would be.
    async fn take(&self, tokens: f64) -> std::result::Result<(), Duration> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.refill(now, self.capacity, self.refill_rate);

        let token_wait = if state.tokens + TOKEN_EPSILON >= tokens {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((tokens - state.tokens) / self.refill_rate)
        };
        let interval_wait = match (self.min_interval, state.last_grant) {
            (Some(min), Some(last)) => min.saturating_sub(now.saturating_duration_since(last)),
            _ => Duration::ZERO,
        };

        let wait = token_wait.max(interval_wait);
        if wait.is_zero() {
            state.tokens = (state.tokens - tokens).max(0.0);
            state.last_grant = Some(now);
            trace!(remaining = state.tokens, "Granted rate-limit tokens");
            Ok(())
        } else {
            Err(wait)
        }
    }

    fn check_request(&self, tokens: f64) -> Result<()> {
        if !(tokens.is_finite() && tokens > 0.0) {
            return Err(FactsError::InvalidParameter(format!(
                "token count must be positive, got {tokens}"
            )));
        }
        if tokens > self.capacity {
            return Err(FactsError::InvalidParameter(format!(
                "requested {tokens} tokens from a bucket of capacity {}",
                self.capacity
            )));
        }
        Ok(())
    }

    /// Acquires `tokens`, applying the configured strategy when they are short.
    ///
    /// Returns how long the call waited.
    ///
    /// # Errors
    ///
    /// - [`FactsError::InvalidParameter`] if `tokens` is not positive or exceeds capacity
    /// - [`FactsError::RateLimitExceeded`] if the strategy gives up or `timeout` elapses
    pub async fn acquire(&self, tokens: f64, timeout: Duration) -> Result<Duration> {
        self.check_request(tokens)?;
        let start = Instant::now();

        loop {
            let wait = match self.take(tokens).await {
                Ok(()) => return Ok(start.elapsed()),
                Err(wait) => wait,
            };
            let waited = start.elapsed();
            let remaining = timeout.saturating_sub(waited);

            match self.strategy {
                RateLimitStrategy::FailFast | RateLimitStrategy::TryOnce => {
                    trace!(strategy = ?self.strategy, ?wait, "Tokens short, not waiting");
                    return Err(FactsError::RateLimitExceeded { waited });
                }
                RateLimitStrategy::Wait => {
                    if remaining.is_zero() {
                        debug!(?waited, "Rate-limit acquire timed out");
                        return Err(FactsError::RateLimitExceeded { waited });
                    }
                    sleep(wait.min(remaining)).await;
                }
            }
        }
    }

    /// Takes `tokens` only if they are available right now.
    ///
    /// Requests that can never succeed (non-positive or above capacity) return
    /// `false`.
    pub async fn try_acquire(&self, tokens: f64) -> bool {
        self.check_request(tokens).is_ok() && self.take(tokens).await.is_ok()
    }
}

/// One [`RateLimiter`] per host, created on first use and kept for the
/// process lifetime.
#[derive(Debug)]
pub struct HostRateLimiters {
    settings: LimiterSettings,
    limiters: RwLock<HashMap<String, Arc<RateLimiter>>>,
}

impl HostRateLimiters {
    /// Creates an empty registry.
    ///
    /// # Errors
    ///
    /// Returns [`FactsError::InvalidParameter`] if the settings cannot build a limiter.
    pub fn new(settings: LimiterSettings) -> Result<Self> {
        // Fail at construction rather than on the first request.
        RateLimiter::from_settings(settings)?;
        Ok(Self {
            settings,
            limiters: RwLock::new(HashMap::new()),
        })
    }

    /// Creates a registry from the pipeline configuration.
    ///
    /// # Errors
    ///
    /// See [`HostRateLimiters::new`].
    pub fn from_config(config: &FactsConfig) -> Result<Self> {
        Self::new(LimiterSettings::from_config(config))
    }

    /// Settings used for new limiters.
    #[must_use]
    pub const fn settings(&self) -> LimiterSettings {
        self.settings
    }

    /// Returns the limiter for `host`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Propagates limiter construction errors.
    pub async fn for_host(&self, host: &str) -> Result<Arc<RateLimiter>> {
        let key = host.to_ascii_lowercase();
        if let Some(limiter) = self.limiters.read().await.get(&key) {
            return Ok(Arc::clone(limiter));
        }

        let mut limiters = self.limiters.write().await;
        if let Some(limiter) = limiters.get(&key) {
            return Ok(Arc::clone(limiter));
        }
        debug!(host = %key, "Creating rate limiter");
        let limiter = Arc::new(RateLimiter::from_settings(self.settings)?);
        limiters.insert(key, Arc::clone(&limiter));
        Ok(limiter)
    }

    /// Number of hosts with a limiter.
    pub async fn len(&self) -> usize {
        self.limiters.read().await.len()
    }

    /// Returns true if no limiter has been created yet.
    pub async fn is_empty(&self) -> bool {
        self.limiters.read().await.is_empty()
    }
}
