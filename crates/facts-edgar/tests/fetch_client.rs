//! Integration tests for rate-limited fetching and retry handling

mod common;

use common::{ARCHIVE, MockTransport, test_config};
use facts_cache::InMemoryCache;
use facts_core::{CachedDocument, ContentKind, DocumentCache, FactsConfig, FactsError};
use facts_edgar::{EdgarFactsProvider, FetchClient, HostRateLimiters, HttpResponse};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn client(config: &FactsConfig, transport: &Arc<MockTransport>) -> FetchClient {
    let limiters = Arc::new(HostRateLimiters::from_config(config).unwrap());
    FetchClient::new(config, transport.clone(), limiters).unwrap()
}

fn doc_url(name: &str) -> String {
    format!("{ARCHIVE}/Archives/edgar/data/1/000000000124000001/{name}")
}

#[tokio::test]
async fn test_missing_contact_makes_no_request() {
    let transport = Arc::new(MockTransport::new());
    let config = test_config().with_contact("  ");
    let limiters = Arc::new(HostRateLimiters::from_config(&test_config()).unwrap());

    let err = FetchClient::new(&config, transport.clone(), limiters.clone()).unwrap_err();
    assert!(matches!(err, FactsError::Configuration(_)));

    let err = EdgarFactsProvider::with_transport(config, transport.clone(), limiters).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test]
async fn test_user_agent_carries_contact() {
    let transport = Arc::new(MockTransport::new());
    let url = doc_url("a.xml");
    transport.xml(&url, "<xbrl/>");

    let fetched = client(&test_config(), &transport)
        .get(&url, &[ContentKind::Xml])
        .await
        .unwrap();
    assert_eq!(fetched.kind, ContentKind::Xml);
    assert_eq!(transport.user_agents(), vec!["Test Suite test@example.com"]);
}

#[tokio::test]
async fn test_not_found_is_requested_once() {
    let transport = Arc::new(MockTransport::new());
    let url = doc_url("missing.xml");
    transport.status(&url, 404);

    let err = client(&test_config(), &transport)
        .get(&url, &[ContentKind::Xml])
        .await
        .unwrap_err();
    assert!(matches!(err, FactsError::NotFound(_)));
    assert_eq!(transport.call_count(&url), 1);
}

#[tokio::test]
async fn test_retry_after_is_honored() {
    let transport = Arc::new(MockTransport::new());
    let url = doc_url("busy.xml");
    transport
        .respond(
            &url,
            HttpResponse::new(429, "text/html", "slow down").with_retry_after(Duration::from_secs(1)),
        )
        .xml(&url, "<xbrl/>");

    let start = Instant::now();
    let fetched = client(&test_config(), &transport)
        .get(&url, &[ContentKind::Xml])
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(fetched.body, "<xbrl/>");
    assert_eq!(transport.call_count(&url), 2);
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let transport = Arc::new(MockTransport::new());
    let url = doc_url("broken.xml");
    transport.status(&url, 503);

    let config = test_config().with_max_retries(4);
    let err = client(&config, &transport)
        .get(&url, &[ContentKind::Xml])
        .await
        .unwrap_err();

    assert_eq!(err, FactsError::Http { url: url.clone(), status: 503 });
    assert_eq!(transport.call_count(&url), 4);
}

#[tokio::test]
async fn test_transient_error_then_success() {
    let transport = Arc::new(MockTransport::new());
    let url = doc_url("flaky.xml");
    transport
        .fail(&url, FactsError::TransientNetwork("connection reset".into()))
        .status(&url, 500)
        .xml(&url, "<xbrl/>");

    let fetched = client(&test_config(), &transport)
        .get(&url, &[ContentKind::Xml])
        .await
        .unwrap();
    assert_eq!(fetched.body, "<xbrl/>");
    assert_eq!(transport.call_count(&url), 3);
}

#[tokio::test]
async fn test_unexpected_content_type_is_rejected() {
    let transport = Arc::new(MockTransport::new());
    let pdf = doc_url("report.pdf");
    let page = doc_url("index.htm");
    transport
        .respond(&pdf, HttpResponse::new(200, "application/pdf", "%PDF"))
        .html(&page, "<html></html>");

    let client = client(&test_config(), &transport);
    let err = client.get(&pdf, &[ContentKind::Xml]).await.unwrap_err();
    assert!(matches!(err, FactsError::ResponseValidation(_)));

    let err = client.get(&page, &[ContentKind::Xml]).await.unwrap_err();
    assert!(err.is_candidate_failure());
    assert_eq!(transport.total_calls(), 2);
}

#[tokio::test]
async fn test_xml_path_accepts_any_xml_content_type() {
    let transport = Arc::new(MockTransport::new());
    let url = doc_url("aapl-20240928_htm.xml");
    transport.respond(&url, HttpResponse::new(200, "application/xhtml+xml", "<xbrl/>"));

    let fetched = client(&test_config(), &transport)
        .get(&url, &[ContentKind::Xml])
        .await
        .unwrap();
    assert_eq!(fetched.kind, ContentKind::Xml);
}

#[tokio::test]
async fn test_cache_hit_skips_transport() {
    let transport = Arc::new(MockTransport::new());
    let cache = Arc::new(InMemoryCache::new());
    let url = doc_url("cached.xml");
    cache
        .put_document(&url, &CachedDocument::new("<xbrl/>", ContentKind::Xml))
        .await
        .unwrap();

    let fetched = client(&test_config(), &transport)
        .with_cache(cache)
        .get(&url, &[ContentKind::Xml])
        .await
        .unwrap();
    assert_eq!(fetched.body, "<xbrl/>");
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test]
async fn test_archive_documents_are_cached_after_fetch() {
    let transport = Arc::new(MockTransport::new());
    let cache = Arc::new(InMemoryCache::new());
    let url = doc_url("fresh.xml");
    transport.xml(&url, "<xbrl/>");

    let client = client(&test_config(), &transport).with_cache(cache.clone());
    client.get(&url, &[ContentKind::Xml]).await.unwrap();
    client.get(&url, &[ContentKind::Xml]).await.unwrap();

    assert_eq!(transport.call_count(&url), 1);
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn test_requests_share_host_limiter() {
    let transport = Arc::new(MockTransport::new());
    let url = doc_url("a.xml");
    transport.xml(&url, "<xbrl/>");

    // Capacity 2 at 10/s: the third and fourth requests wait ~100ms each.
    let config = test_config().with_rate_limit(10.0, 2.0);
    let client = client(&config, &transport);

    let start = Instant::now();
    for _ in 0..4 {
        client.get(&url, &[ContentKind::Xml]).await.unwrap();
    }
    assert!(start.elapsed() >= Duration::from_millis(180));
    assert_eq!(client.limiters().len().await, 1);
}
