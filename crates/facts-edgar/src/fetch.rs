//! Rate-limited HTTP fetching with retry and content-type validation.
//!
//! [`FetchClient::get`] is the only way the pipeline touches the network. Each
//! physical request first takes a token from the limiter of the URL's host.
//! The HTTP layer itself sits behind [`HttpTransport`] so tests can script
//! responses.

use async_trait::async_trait;
use facts_core::{CachedDocument, ContentKind, DocumentCache, FactsConfig, FactsError, Result};
use reqwest::Url;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::rate_limit::HostRateLimiters;

/// Wait applied to a 429 response that carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(10);

/// Raw response as seen by the fetch layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header, if present.
    pub content_type: Option<String>,
    /// `Retry-After` header in seconds, if present and numeric.
    pub retry_after: Option<Duration>,
    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// Creates a response with a status, content type and body.
    #[must_use]
    pub fn new(status: u16, content_type: &str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: Some(content_type.to_string()),
            retry_after: None,
            body: body.into(),
        }
    }

    /// Sets the `Retry-After` value.
    #[must_use]
    pub const fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// A single physical HTTP GET.
///
/// Implementations report connection-level failures as
/// [`FactsError::TransientNetwork`] and return every HTTP status as a
/// response; status handling belongs to [`FetchClient`].
#[async_trait]
pub trait HttpTransport: Send + Sync + fmt::Debug {
    /// Performs one GET request.
    async fn get(&self, url: &str, user_agent: &str, timeout: Duration) -> Result<HttpResponse>;
}

/// [`HttpTransport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a fresh client.
    ///
    /// # Errors
    ///
    /// Returns [`FactsError::Configuration`] if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| FactsError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Creates a transport around a pre-configured client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, user_agent: &str, timeout: Duration) -> Result<HttpResponse> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FactsError::TransientNetwork(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        let body = response
            .text()
            .await
            .map_err(|e| FactsError::TransientNetwork(e.to_string()))?;

        Ok(HttpResponse {
            status,
            content_type,
            retry_after,
            body,
        })
    }
}

/// A validated response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    /// URL the body was fetched from.
    pub url: String,
    /// Response body.
    pub body: String,
    /// Classified content kind.
    pub kind: ContentKind,
}

/// Rate-limited, retrying GET client.
pub struct FetchClient {
    transport: Arc<dyn HttpTransport>,
    limiters: Arc<HostRateLimiters>,
    cache: Option<Arc<dyn DocumentCache>>,
    contact: String,
    max_retries: u32,
    base_delay: Duration,
    acquire_timeout: Duration,
    request_timeout: Duration,
}

impl fmt::Debug for FetchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchClient")
            .field("transport", &self.transport)
            .field("contact", &self.contact)
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("cache", &self.cache.as_ref().map(|_| "configured"))
            .finish_non_exhaustive()
    }
}

impl FetchClient {
    /// Creates a client. The configuration is validated first, so a client
    /// without a contact string cannot be built.
    ///
    /// # Errors
    ///
    /// Returns [`FactsError::Configuration`] if the configuration is invalid.
    pub fn new(
        config: &FactsConfig,
        transport: Arc<dyn HttpTransport>,
        limiters: Arc<HostRateLimiters>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            limiters,
            cache: None,
            contact: config.contact.trim().to_string(),
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
            acquire_timeout: config.acquire_timeout(),
            request_timeout: config.request_timeout(),
        })
    }

    /// Serves archive documents from `cache` when possible.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn DocumentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Shared host limiters.
    #[must_use]
    pub fn limiters(&self) -> &Arc<HostRateLimiters> {
        &self.limiters
    }

    /// Archive documents are immutable; index and ticker files are not.
    fn is_cacheable(url: &str) -> bool {
        url.contains("/Archives/")
    }

    fn check_kind(url: &str, kind: ContentKind, expected: &[ContentKind]) -> Result<()> {
        if expected.contains(&kind) {
            Ok(())
        } else {
            Err(FactsError::ResponseValidation(format!(
                "{url} returned {kind}, expected one of {expected:?}"
            )))
        }
    }

    /// Fetches `url` and checks that its content kind is one of `expected`.
    ///
    /// Retries up to `max_retries` physical attempts. A 429 waits for
    /// `Retry-After` (10s by default) without growing the backoff; other
    /// failures wait `base_delay * 2^n`. A 404 fails immediately.
    ///
    /// # Errors
    ///
    /// - [`FactsError::Configuration`] if no contact string is set (no request is made)
    /// - [`FactsError::NotFound`] for a 404
    /// - [`FactsError::ResponseValidation`] for an unknown or unexpected content type
    /// - [`FactsError::RateLimited`], [`FactsError::Http`] or
    ///   [`FactsError::TransientNetwork`] once retries are exhausted
    /// - [`FactsError::RateLimitExceeded`] if the local limiter times out
    #[instrument(skip(self, expected), fields(url = %url))]
    pub async fn get(&self, url: &str, expected: &[ContentKind]) -> Result<FetchedDocument> {
        if self.contact.is_empty() {
            return Err(FactsError::Configuration(
                "a contact string is required before any request".to_string(),
            ));
        }

        let cacheable = Self::is_cacheable(url);
        if cacheable
            && let Some(cache) = &self.cache
        {
            match cache.get_document(url).await {
                Ok(Some(doc)) => {
                    debug!("Serving document from cache");
                    Self::check_kind(url, doc.kind, expected)?;
                    return Ok(FetchedDocument {
                        url: url.to_string(),
                        body: doc.body,
                        kind: doc.kind,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Cache lookup failed"),
            }
        }

        let parsed =
            Url::parse(url).map_err(|e| FactsError::InvalidParameter(format!("{url}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| FactsError::InvalidParameter(format!("{url} has no host")))?;
        let limiter = self.limiters.for_host(host).await?;

        let mut backoff_exponent = 0u32;
        let mut last_error = FactsError::TransientNetwork(format!("no attempt made for {url}"));

        for attempt in 1..=self.max_retries {
            limiter.acquire(1.0, self.acquire_timeout).await?;
            let is_last = attempt == self.max_retries;

            let response = match self
                .transport
                .get(url, &self.contact, self.request_timeout)
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_transient() => {
                    warn!(attempt, error = %e, "Request failed");
                    last_error = e;
                    if !is_last {
                        sleep(self.backoff(backoff_exponent)).await;
                        backoff_exponent += 1;
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            match response.status {
                _ if response.is_success() => {
                    let content_type = response.content_type.as_deref().unwrap_or_default();
                    let kind = ContentKind::classify(content_type, url).ok_or_else(|| {
                        FactsError::ResponseValidation(format!(
                            "{url} returned unsupported content type {content_type:?}"
                        ))
                    })?;
                    Self::check_kind(url, kind, expected)?;

                    if cacheable && let Some(cache) = &self.cache {
                        let doc = CachedDocument::new(response.body.clone(), kind);
                        if let Err(e) = cache.put_document(url, &doc).await {
                            warn!(error = %e, "Failed to cache document");
                        }
                    }

                    debug!(attempt, %kind, bytes = response.body.len(), "Fetched");
                    return Ok(FetchedDocument {
                        url: url.to_string(),
                        body: response.body,
                        kind,
                    });
                }
                404 => return Err(FactsError::NotFound(url.to_string())),
                429 => {
                    let wait = response.retry_after.unwrap_or(DEFAULT_RETRY_AFTER);
                    warn!(attempt, ?wait, "Rate limited by host");
                    last_error = FactsError::RateLimited {
                        url: url.to_string(),
                        retry_after: response.retry_after,
                    };
                    if !is_last {
                        sleep(wait).await;
                    }
                }
                status => {
                    warn!(attempt, status, "Request returned error status");
                    last_error = FactsError::Http {
                        url: url.to_string(),
                        status,
                    };
                    if !is_last {
                        sleep(self.backoff(backoff_exponent)).await;
                        backoff_exponent += 1;
                    }
                }
            }
        }

        Err(last_error)
    }

    /// Fetches `url` as JSON and deserializes it.
    ///
    /// # Errors
    ///
    /// As [`FetchClient::get`], plus [`FactsError::Parse`] if the body does
    /// not deserialize into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let doc = self.get(url, &[ContentKind::Json]).await?;
        serde_json::from_str(&doc.body)
            .map_err(|e| FactsError::Parse(format!("Failed to parse JSON from {url}: {e}")))
    }

    fn backoff(&self, exponent: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(exponent))
    }
}
