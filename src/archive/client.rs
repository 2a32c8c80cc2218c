// src/archive/client.rs
// =============================================================================
// HTTP access to the Wayback Machine.
//
// Three endpoints are used:
// - CDX listing: every capture under a domain, paginated
// - Availability: the closest capture of a single URL
// - Content: the raw archived payload of one capture
//
// Every request goes through `fetch_with_retry`, which:
// 1. Waits on the shared RateLimiter before each attempt (retries included)
// 2. Sends the request and reads the full body
// 3. Classifies any failure into an ErrorKind
// 4. Sleeps and tries again for transient kinds, per the RetryPolicy
//
// Errors are returned as values. A listing never aborts because one page
// failed: the failed page is yielded as a ListingError and the remaining
// pages are still requested.
// =============================================================================

use anyhow::{anyhow, Context, Result};
use async_stream::stream;
use futures::stream::BoxStream;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::cdx::{self, CdxQuery, SnapshotRecord};
use super::rate_limit::RateLimiter;
use super::retry::{parse_retry_after, RetryDecision, RetryPolicy};
use crate::config::{Endpoints, ScanConfig};
use crate::error::ErrorKind;

// A listing request (page count or a single page) that failed for good
#[derive(Debug, Clone, PartialEq)]
pub struct ListingError {
    /// Which request failed, e.g. "example.com#page=3"
    pub location: String,
    pub kind: ErrorKind,
}

// Raw bytes of one archived capture
#[derive(Debug, Clone)]
pub struct ArchivedContent {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

// Shape of the availability API response:
//   {"archived_snapshots": {"closest": {"available": true, "url": "...",
//    "timestamp": "20200101000000", "status": "200"}}}
#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    #[serde(default)]
    archived_snapshots: ArchivedSnapshots,
}

#[derive(Debug, Default, Deserialize)]
struct ArchivedSnapshots {
    closest: Option<ClosestCapture>,
}

#[derive(Debug, Deserialize)]
struct ClosestCapture {
    #[serde(default)]
    available: bool,
    timestamp: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Clone)]
pub struct ArchiveClient {
    http: Client,
    limiter: RateLimiter,
    retry: RetryPolicy,
    endpoints: Endpoints,
}

impl ArchiveClient {
    pub fn new(config: &ScanConfig) -> Result<Self> {
        config.validate()?;

        let limiter = RateLimiter::per_second(config.requests_per_second)
            .ok_or_else(|| anyhow!("invalid request rate: {}", config.requests_per_second))?;

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build HTTP client")?;
        debug!(interval_ms = limiter.period().as_millis() as u64, retries = config.retry.max_retries, "archive client ready");

        Ok(Self {
            http,
            limiter,
            retry: config.retry.clone(),
            endpoints: config.endpoints.clone(),
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    // Lists every capture matching the query, lazily.
    //
    // The page count is requested first, then pages 0..n one at a time as
    // the consumer pulls. Dropping the stream early stops further requests.
    // (url, timestamp) pairs already yielded are not yielded again.
    pub fn list_snapshots(&self, query: CdxQuery) -> BoxStream<'_, Result<SnapshotRecord, ListingError>> {
        Box::pin(stream! {
            let pages = match self.page_count(&query).await {
                Ok(pages) => pages,
                Err(kind) => {
                    warn!(domain = %query.url, error = %kind, "could not determine listing size");
                    yield Err(ListingError {
                        location: format!("{}#page-count", query.url),
                        kind,
                    });
                    return;
                }
            };
            debug!(domain = %query.url, pages, "listing snapshots");

            let mut seen: HashSet<(String, String)> = HashSet::new();
            let mut yielded = 0usize;

            for page in 0..pages {
                match self.list_page(&query, page).await {
                    Ok(parsed) => {
                        if parsed.skipped > 0 {
                            debug!(domain = %query.url, page, skipped = parsed.skipped, "dropped malformed rows");
                        }
                        for record in parsed.records {
                            if seen.insert((record.url.clone(), record.timestamp.clone())) {
                                yielded += 1;
                                yield Ok(record);
                            }
                        }
                    }
                    Err(kind) => {
                        warn!(domain = %query.url, page, error = %kind, "listing page failed");
                        yield Err(ListingError {
                            location: format!("{}#page={}", query.url, page),
                            kind,
                        });
                    }
                }
            }

            info!(domain = %query.url, pages, snapshots = yielded, "listing complete");
        })
    }

    async fn page_count(&self, query: &CdxQuery) -> Result<u32, ErrorKind> {
        let mut params = query.params();
        params.push(("showNumPages", "true".to_string()));

        let body = self
            .get_text(|| self.http.get(&self.endpoints.cdx).query(&params))
            .await?;
        cdx::parse_page_count(&body)
    }

    async fn list_page(&self, query: &CdxQuery, page: u32) -> Result<cdx::ParsedPage, ErrorKind> {
        let mut params = query.params();
        params.push(("page", page.to_string()));

        let body = self
            .get_text(|| self.http.get(&self.endpoints.cdx).query(&params))
            .await?;
        cdx::parse_listing(&body)
    }

    /// Retrieves the raw archived payload of one capture.
    pub async fn fetch_content(&self, url: &str, timestamp: &str) -> Result<ArchivedContent, ErrorKind> {
        let target = cdx::content_url(&self.endpoints.content, timestamp, url);

        let content = self.fetch_with_retry(|| self.http.get(&target)).await?;

        debug!(url = %url, timestamp = %timestamp, bytes = content.bytes.len(), "fetched archived content");
        Ok(content)
    }

    /// Asks the availability API for the capture of `url` closest to now.
    ///
    /// Ok(None) means the archive has no capture marked available with
    /// status 200.
    pub async fn closest_snapshot(&self, url: &str) -> Result<Option<SnapshotRecord>, ErrorKind> {
        let body = self
            .get_text(|| self.http.get(&self.endpoints.availability).query(&[("url", url)]))
            .await?;
        let parsed: AvailabilityResponse =
            serde_json::from_str(&body).map_err(|e| ErrorKind::ParseError(e.to_string()))?;

        let closest = match parsed.archived_snapshots.closest {
            Some(closest) if closest.available && closest.status == "200" => closest,
            _ => return Ok(None),
        };

        Ok(Some(SnapshotRecord {
            url: url.to_string(),
            timestamp: closest.timestamp,
            status_code: Some(200),
            mime_type: "unknown".to_string(),
            content_length: None,
        }))
    }

    async fn get_text<F>(&self, make_request: F) -> Result<String, ErrorKind>
    where
        F: Fn() -> RequestBuilder,
    {
        let content = self.fetch_with_retry(make_request).await?;
        Ok(String::from_utf8_lossy(&content.bytes).into_owned())
    }

    // Sends a request built by `make_request` and reads its whole body,
    // until that succeeds, fails permanently, or the retry budget is spent.
    // The builder is called once per attempt since a RequestBuilder is
    // consumed by send().
    //
    // The body is read inside the loop: a connection that drops halfway
    // through a payload is as transient as one that never connected.
    async fn fetch_with_retry<F>(&self, make_request: F) -> Result<ArchivedContent, ErrorKind>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u32 = 0;

        loop {
            // Every attempt, retries included, counts against the rate limit
            self.limiter.acquire().await;

            let (error, retry_after) = match make_request().send().await {
                Ok(response) if response.status().is_success() => {
                    let content_type = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(|s| s.to_string());
                    match response.bytes().await {
                        Ok(bytes) => {
                            return Ok(ArchivedContent {
                                bytes: bytes.to_vec(),
                                content_type,
                            })
                        }
                        Err(e) => {
                            debug!(error = %e, "response body interrupted");
                            (ErrorKind::from_body_error(e), None)
                        }
                    }
                }
                Ok(response) => {
                    debug!(url = %response.url(), status = response.status().as_u16(), "unsuccessful response");
                    (
                        ErrorKind::from_status(response.status()),
                        parse_retry_after(response.headers()),
                    )
                }
                Err(e) => (ErrorKind::from(e), None),
            };

            match self.retry.decide(attempt, &error, retry_after) {
                RetryDecision::RetryAfter(delay) => {
                    attempt += 1;
                    warn!(
                        error = %error,
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    if error.is_transient() {
                        warn!(error = %error, attempts = attempt + 1, "retries exhausted");
                    }
                    return Err(error);
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. What is `stream!`?
//    - A macro from async-stream that writes a Stream like a normal async
//      block: each `yield` hands one item to whoever is polling
//    - Nothing runs until the consumer asks for the next item, which is why
//      dropping the stream stops further page requests
//
// 2. Why take `make_request: F` instead of a RequestBuilder?
//    - send() consumes the builder, so a retry needs a fresh one
//    - A closure (`Fn() -> RequestBuilder`) can build one per attempt
//
// 3. Why BoxStream<'_, ...>?
//    - The stream borrows `self` (the client), hence the '_ lifetime
//    - Boxing hides the long generated type behind one name
//
// 4. Why is the body read inside the retry loop?
//    - A 200 status only means the headers arrived
//    - The payload can still be cut off; that counts as a transient failure
// -----------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn test_config(base: &str) -> ScanConfig {
        ScanConfig {
            requests_per_second: 1000.0,
            concurrency: 4,
            timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_retries: 3,
                base_delay: Duration::from_millis(10),
                factor: 2.0,
                max_delay: Duration::from_millis(200),
            },
            user_agent: "wayback-scan-tests".to_string(),
            endpoints: Endpoints::with_base(base),
        }
    }

    pub(crate) async fn mount_page_count(server: &MockServer, pages: u32) {
        Mock::given(method("GET"))
            .and(path("/cdx/search/cdx"))
            .and(query_param("showNumPages", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_string(pages.to_string()))
            .mount(server)
            .await;
    }

    pub(crate) async fn mount_page(server: &MockServer, page: u32, rows: &[(&str, &str)]) {
        let mut body = vec![cdx::FIELDS.iter().map(|f| f.to_string()).collect::<Vec<_>>()];
        for (url, timestamp) in rows {
            body.push(vec![
                url.to_string(),
                timestamp.to_string(),
                "application/octet-stream".to_string(),
                "200".to_string(),
                "100".to_string(),
            ]);
        }
        Mock::given(method("GET"))
            .and(path("/cdx/search/cdx"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn requests_for_page(server: &MockServer, page: u32) -> usize {
        let needle = format!("page={}", page);
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.query().map_or(false, |q| q.split('&').any(|p| p == needle)))
            .count()
    }

    async fn collect(
        client: &ArchiveClient,
        domain: &str,
    ) -> (Vec<SnapshotRecord>, Vec<ListingError>) {
        let mut records = Vec::new();
        let mut errors = Vec::new();
        let mut listing = client.list_snapshots(CdxQuery::new(domain));
        while let Some(item) = listing.next().await {
            match item {
                Ok(record) => records.push(record),
                Err(e) => errors.push(e),
            }
        }
        (records, errors)
    }

    #[tokio::test]
    async fn test_lists_across_pages_without_duplicates() {
        let server = MockServer::start().await;
        mount_page_count(&server, 2).await;
        mount_page(
            &server,
            0,
            &[
                ("http://example.com/a.pdf", "20200101000000"),
                ("http://example.com/b.pdf", "20200101000000"),
            ],
        )
        .await;
        mount_page(
            &server,
            1,
            &[
                ("http://example.com/a.pdf", "20200101000000"),
                ("http://example.com/a.pdf", "20210101000000"),
            ],
        )
        .await;

        let client = ArchiveClient::new(&test_config(&server.uri())).unwrap();
        let (records, errors) = collect(&client, "example.com").await;

        assert!(errors.is_empty());
        assert_eq!(records.len(), 3);
        let unique: HashSet<_> = records.iter().map(|r| (&r.url, &r.timestamp)).collect();
        assert_eq!(unique.len(), records.len());
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;
        mount_page_count(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/cdx/search/cdx"))
            .and(query_param("page", "0"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        mount_page(&server, 0, &[("http://example.com/a.pdf", "20200101000000")]).await;

        let client = ArchiveClient::new(&test_config(&server.uri())).unwrap();
        let start = Instant::now();
        let (records, errors) = collect(&client, "example.com").await;

        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        assert_eq!(records.len(), 1);
        assert_eq!(requests_for_page(&server, 0).await, 4);
        // Backoff of 10ms, 20ms, 40ms between the four attempts
        assert!(start.elapsed() >= Duration::from_millis(70));
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_page_error() {
        let server = MockServer::start().await;
        mount_page_count(&server, 2).await;
        Mock::given(method("GET"))
            .and(path("/cdx/search/cdx"))
            .and(query_param("page", "0"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mount_page(&server, 1, &[("http://example.com/a.pdf", "20200101000000")]).await;

        let client = ArchiveClient::new(&test_config(&server.uri())).unwrap();
        let (records, errors) = collect(&client, "example.com").await;

        assert_eq!(records.len(), 1);
        assert_eq!(
            errors,
            vec![ListingError {
                location: "example.com#page=0".to_string(),
                kind: ErrorKind::ServerError(500),
            }]
        );
        assert_eq!(requests_for_page(&server, 0).await, 4);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        mount_page_count(&server, 2).await;
        mount_page(&server, 0, &[("http://example.com/a.pdf", "20200101000000")]).await;
        Mock::given(method("GET"))
            .and(path("/cdx/search/cdx"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = ArchiveClient::new(&test_config(&server.uri())).unwrap();
        let (records, errors) = collect(&client, "example.com").await;

        assert_eq!(records.len(), 1);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ErrorKind::ClientError(404));
        assert_eq!(requests_for_page(&server, 1).await, 1);
    }

    #[tokio::test]
    async fn test_failed_page_count_ends_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cdx/search/cdx"))
            .and(query_param("showNumPages", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>blocked</html>"))
            .mount(&server)
            .await;

        let client = ArchiveClient::new(&test_config(&server.uri())).unwrap();
        let (records, errors) = collect(&client, "example.com").await;

        assert!(records.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].location, "example.com#page-count");
        assert!(matches!(errors[0].kind, ErrorKind::ParseError(_)));
    }

    #[tokio::test]
    async fn test_dropping_listing_stops_pagination() {
        let server = MockServer::start().await;
        mount_page_count(&server, 2).await;
        mount_page(&server, 0, &[("http://example.com/a.pdf", "20200101000000")]).await;
        mount_page(&server, 1, &[("http://example.com/b.pdf", "20200101000000")]).await;

        let client = ArchiveClient::new(&test_config(&server.uri())).unwrap();
        let first: Vec<_> = client
            .list_snapshots(CdxQuery::new("example.com"))
            .take(1)
            .collect()
            .await;

        assert_eq!(first.len(), 1);
        assert_eq!(requests_for_page(&server, 1).await, 0);
    }

    #[tokio::test]
    async fn test_rate_limited_response_honours_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/web/20200101000000id_/http://example.com/a.pdf"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/web/20200101000000id_/http://example.com/a.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.4".to_vec()),
            )
            .mount(&server)
            .await;

        let mut config = test_config(&server.uri());
        config.retry.max_delay = Duration::from_secs(5);
        let client = ArchiveClient::new(&config).unwrap();

        let start = Instant::now();
        let content = client
            .fetch_content("http://example.com/a.pdf", "20200101000000")
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(content.bytes, b"%PDF-1.4");
        assert_eq!(content.content_type.as_deref(), Some("application/pdf"));
    }

    #[tokio::test]
    async fn test_fetch_content_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = ArchiveClient::new(&test_config(&server.uri())).unwrap();
        let result = client
            .fetch_content("http://example.com/gone.pdf", "20200101000000")
            .await;

        assert_eq!(result.unwrap_err(), ErrorKind::ClientError(404));
    }

    #[tokio::test]
    async fn test_closest_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wayback/available"))
            .and(query_param("url", "http://example.com/a.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "archived_snapshots": {
                    "closest": {
                        "available": true,
                        "url": "http://web.archive.org/web/20200101000000/http://example.com/a.pdf",
                        "timestamp": "20200101000000",
                        "status": "200"
                    }
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wayback/available"))
            .and(query_param("url", "http://example.com/missing.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "archived_snapshots": {}
            })))
            .mount(&server)
            .await;

        let client = ArchiveClient::new(&test_config(&server.uri())).unwrap();

        let found = client.closest_snapshot("http://example.com/a.pdf").await.unwrap();
        assert_eq!(found.map(|r| r.timestamp), Some("20200101000000".to_string()));

        let missing = client.closest_snapshot("http://example.com/missing.pdf").await.unwrap();
        assert!(missing.is_none());
    }

    // Plain TCP server: the first connection announces 100 bytes but sends
    // five and hangs up, every later connection gets the whole payload.
    async fn serve_truncated_then_full(payload: &'static [u8]) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let seen = counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut request = [0u8; 4096];
                    let _ = socket.read(&mut request).await;

                    let mut response = if seen == 0 {
                        b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\n".to_vec()
                    } else {
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: application/pdf\r\nConnection: close\r\n\r\n",
                            payload.len()
                        )
                        .into_bytes()
                    };
                    let body = if seen == 0 { &payload[..5] } else { payload };
                    response.extend_from_slice(body);

                    let _ = socket.write_all(&response).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{}", addr), connections)
    }

    #[tokio::test]
    async fn test_truncated_body_is_retried() {
        let payload: &'static [u8] = b"%PDF-1.4 the whole archived document";
        let (base, connections) = serve_truncated_then_full(payload).await;
        let client = ArchiveClient::new(&test_config(&base)).unwrap();

        let content = client
            .fetch_content("http://example.com/a.pdf", "20200101000000")
            .await
            .unwrap();

        assert_eq!(content.bytes, payload);
        assert_eq!(content.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(connections.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = ScanConfig::default();
        config.concurrency = 0;
        assert!(ArchiveClient::new(&config).is_err());
    }
}
