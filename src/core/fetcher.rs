//! HTTP retrieval with timeout, redirect, size and retry policy.

use crate::core::robots;
use crate::domain::model::{FetchResult, FetchStatus};
use crate::domain::ports::Fetch;
use crate::utils::error::{FetchError, Result};
use crate::utils::validation::validate_url;
use reqwest::header::{CONTENT_TYPE, LOCATION, USER_AGENT};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::{Duration, Instant};
use url::Url;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Hard limit for one attempt, covering connect, headers and body.
    pub timeout: Duration,
    pub max_redirects: usize,
    pub max_body_bytes: u64,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub user_agent: String,
    pub respect_robots: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_redirects: 5,
            max_body_bytes: 5 * 1024 * 1024,
            max_retries: 2,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(4),
            user_agent: concat!("page-analyst/", env!("CARGO_PKG_VERSION")).to_string(),
            respect_robots: true,
        }
    }
}

impl FetchOptions {
    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }
}

/// Directly supplied content, bypassing the network.
pub fn fetch_raw(text: impl Into<String>) -> FetchResult {
    FetchResult::raw(text)
}

/// Supplied bytes; the extractor detects their charset.
pub fn fetch_raw_bytes(body: Vec<u8>) -> FetchResult {
    FetchResult::raw_bytes(body)
}

struct Page {
    final_url: Url,
    status: u16,
    content_type: Option<String>,
    body: Vec<u8>,
}

struct AttemptError {
    error: FetchError,
    retriable: bool,
}

impl AttemptError {
    fn transient(error: FetchError) -> Self {
        Self {
            error,
            retriable: true,
        }
    }

    fn fatal(error: FetchError) -> Self {
        Self {
            error,
            retriable: false,
        }
    }
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Redirects are followed by hand so every hop is checked for loops.
    pub fn new() -> Result<Self> {
        let client = Client::builder().redirect(Policy::none()).build()?;
        Ok(Self { client })
    }

    async fn attempt(&self, url: &Url, options: &FetchOptions) -> std::result::Result<Page, AttemptError> {
        let mut current = url.clone();
        let mut visited = vec![current.clone()];

        loop {
            let response = self
                .client
                .get(current.clone())
                .header(USER_AGENT, options.user_agent.as_str())
                .send()
                .await
                .map_err(classify_send_error)?;

            let status = response.status();
            tracing::debug!("GET {} -> {}", current, status);

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let Some(location) = location else {
                    return Err(AttemptError::fatal(FetchError::HttpError(status.as_u16())));
                };
                let next = current.join(&location).map_err(|_| {
                    AttemptError::fatal(FetchError::InvalidUrl(location.clone()))
                })?;
                if visited.contains(&next) || visited.len() > options.max_redirects {
                    tracing::warn!("Redirect chain from {} stopped at {}", url, next);
                    return Err(AttemptError::fatal(FetchError::RedirectLoop));
                }
                visited.push(next.clone());
                current = next;
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                return Err(AttemptError::transient(FetchError::HttpError(status.as_u16())));
            }
            if !status.is_success() {
                return Err(AttemptError::fatal(FetchError::HttpError(status.as_u16())));
            }

            let limit = options.max_body_bytes;
            if response.content_length().is_some_and(|len| len > limit) {
                return Err(AttemptError::fatal(FetchError::TooLarge { limit }));
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let mut response = response;
            let mut body = Vec::new();
            while let Some(chunk) = response.chunk().await.map_err(classify_body_error)? {
                if (body.len() + chunk.len()) as u64 > limit {
                    return Err(AttemptError::fatal(FetchError::TooLarge { limit }));
                }
                body.extend_from_slice(&chunk);
            }

            return Ok(Page {
                final_url: current,
                status: status.as_u16(),
                content_type,
                body,
            });
        }
    }
}

#[async_trait::async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchResult {
        let started = Instant::now();
        let elapsed = || started.elapsed().as_millis() as u64;

        let parsed = match validate_url("url", url) {
            Ok(u) => u,
            Err(e) => {
                tracing::debug!("Rejecting {}: {}", url, e);
                return FetchResult::failure(url, FetchError::InvalidUrl(url.to_string()), 0, 0);
            }
        };

        if options.respect_robots
            && !robots::is_allowed(
                &self.client,
                &parsed,
                &options.user_agent,
                options.timeout,
                options.max_body_bytes,
            )
            .await
        {
            return FetchResult::failure(url, FetchError::RobotsDisallowed, 0, elapsed());
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = match tokio::time::timeout(options.timeout, self.attempt(&parsed, options)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(AttemptError::transient(FetchError::Timeout)),
            };

            match outcome {
                Ok(page) => {
                    tracing::info!(
                        "Fetched {} bytes from {} in {}ms ({} attempt(s))",
                        page.body.len(),
                        url,
                        elapsed(),
                        attempts
                    );
                    let encoding = page
                        .content_type
                        .as_deref()
                        .and_then(charset_from_content_type)
                        .unwrap_or_else(|| "unknown".to_string());
                    return FetchResult {
                        url: url.to_string(),
                        final_url: (page.final_url != parsed).then(|| page.final_url.to_string()),
                        status: FetchStatus::Success,
                        http_status: Some(page.status),
                        body: Some(page.body),
                        content_type: page.content_type,
                        encoding,
                        elapsed_ms: elapsed(),
                        attempts,
                        error: None,
                    };
                }
                Err(failure) if failure.retriable && attempts <= options.max_retries => {
                    let delay = options.backoff_delay(attempts);
                    tracing::warn!(
                        "Attempt {} for {} failed ({}), retrying in {:?}",
                        attempts,
                        url,
                        failure.error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(failure) => {
                    tracing::warn!("Fetching {} failed after {} attempt(s): {}", url, attempts, failure.error);
                    return FetchResult::failure(url, failure.error, attempts, elapsed());
                }
            }
        }
    }
}

/// `charset` parameter of a Content-Type header value, lowercased.
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

fn root_cause(error: &reqwest::Error) -> String {
    let mut cause: &dyn std::error::Error = error;
    while let Some(source) = cause.source() {
        cause = source;
    }
    cause.to_string()
}

const DNS_FAILURE_MARKERS: [&str; 5] = [
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "nodename nor servname",
    "no such host",
];

/// reqwest exposes no DNS error kind, so the source chain is matched by text.
fn is_dns_failure(error: &reqwest::Error) -> bool {
    let mut cause: Option<&dyn std::error::Error> = Some(error);
    while let Some(current) = cause {
        let text = current.to_string().to_ascii_lowercase();
        if DNS_FAILURE_MARKERS.iter().any(|m| text.contains(m)) {
            return true;
        }
        cause = current.source();
    }
    false
}

fn classify_send_error(error: reqwest::Error) -> AttemptError {
    if error.is_timeout() {
        return AttemptError::transient(FetchError::Timeout);
    }
    if error.is_builder() {
        return AttemptError::fatal(FetchError::InvalidUrl(root_cause(&error)));
    }
    if is_dns_failure(&error) {
        return AttemptError::fatal(FetchError::ConnectionFailed(root_cause(&error)));
    }
    AttemptError::transient(FetchError::ConnectionFailed(root_cause(&error)))
}

fn classify_body_error(error: reqwest::Error) -> AttemptError {
    if error.is_timeout() {
        AttemptError::transient(FetchError::Timeout)
    } else {
        AttemptError::transient(FetchError::ConnectionFailed(root_cause(&error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn quick_options() -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(5),
            backoff_base: Duration::from_millis(1),
            backoff_max: Duration::from_millis(5),
            ..FetchOptions::default()
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let options = FetchOptions::default();
        assert_eq!(options.backoff_delay(1), Duration::from_millis(250));
        assert_eq!(options.backoff_delay(2), Duration::from_millis(500));
        assert_eq!(options.backoff_delay(3), Duration::from_secs(1));
        assert_eq!(options.backoff_delay(10), Duration::from_secs(4));
    }

    #[test]
    fn test_robots_are_respected_by_default() {
        assert!(FetchOptions::default().respect_robots);
    }

    #[test]
    fn test_charset_from_content_type() {
        assert_eq!(
            charset_from_content_type("text/html; charset=\"Windows-1251\""),
            Some("windows-1251".to_string())
        );
        assert_eq!(charset_from_content_type("text/html"), None);
    }

    #[test]
    fn test_fetch_raw_bypasses_network() {
        let result = fetch_raw("hello");
        assert!(result.is_success());
        assert_eq!(result.http_status, None);
        assert_eq!(result.body.as_deref(), Some("hello".as_bytes()));

        let bytes = fetch_raw_bytes(vec![0xcf, 0xf0]);
        assert!(bytes.is_success());
        assert_eq!(bytes.encoding, "unknown");
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start();
        let page = server.mock(|when, then| {
            when.method(GET).path("/page");
            then.status(200)
                .header("Content-Type", "text/html; charset=utf-8")
                .body("<html><title>Hi</title></html>");
        });

        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher.fetch(&server.url("/page"), &quick_options()).await;

        page.assert();
        assert!(result.is_success());
        assert_eq!(result.http_status, Some(200));
        assert_eq!(result.encoding, "utf-8");
        assert_eq!(result.attempts, 1);
        assert!(result.final_url.is_none());
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start();
        let missing = server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        });

        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher.fetch(&server.url("/missing"), &quick_options()).await;

        missing.assert_hits(1);
        assert_eq!(result.status, FetchStatus::Failure);
        assert_eq!(result.error, Some(FetchError::HttpError(404)));
        assert_eq!(result.http_status, Some(404));
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start();
        let flaky = server.mock(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503);
        });

        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher.fetch(&server.url("/flaky"), &quick_options()).await;

        flaky.assert_hits(3);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.error, Some(FetchError::HttpError(503)));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start();
        let limited = server.mock(|when, then| {
            when.method(GET).path("/limited");
            then.status(429);
        });

        let options = FetchOptions {
            max_retries: 1,
            ..quick_options()
        };
        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher.fetch(&server.url("/limited"), &options).await;

        limited.assert_hits(2);
        assert_eq!(result.error, Some(FetchError::HttpError(429)));
    }

    #[tokio::test]
    async fn test_timeout_is_a_hard_boundary() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).body("late").delay(Duration::from_millis(1500));
        });

        let options = FetchOptions {
            timeout: Duration::from_millis(100),
            max_retries: 0,
            ..quick_options()
        };
        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher.fetch(&server.url("/slow"), &options).await;

        assert_eq!(result.error, Some(FetchError::Timeout));
        assert!(result.body.is_none());
        assert!(result.elapsed_ms < 1500);
    }

    #[tokio::test]
    async fn test_oversized_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/big");
            then.status(200).body("x".repeat(2048));
        });

        let options = FetchOptions {
            max_body_bytes: 1024,
            ..quick_options()
        };
        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher.fetch(&server.url("/big"), &options).await;

        assert_eq!(result.error, Some(FetchError::TooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn test_redirects_are_followed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/old");
            then.status(301).header("Location", "/new");
        });
        server.mock(|when, then| {
            when.method(GET).path("/new");
            then.status(200).body("moved here");
        });

        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher.fetch(&server.url("/old"), &quick_options()).await;

        assert!(result.is_success());
        assert_eq!(result.final_url, Some(server.url("/new")));
        assert_eq!(result.body.as_deref(), Some("moved here".as_bytes()));
    }

    #[tokio::test]
    async fn test_redirect_loop() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/a");
            then.status(302).header("Location", "/b");
        });
        server.mock(|when, then| {
            when.method(GET).path("/b");
            then.status(302).header("Location", "/a");
        });

        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher.fetch(&server.url("/a"), &quick_options()).await;

        assert_eq!(result.error, Some(FetchError::RedirectLoop));
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn test_redirect_limit() {
        let server = MockServer::start();
        for i in 0..4 {
            let from = format!("/hop{}", i);
            let to = format!("/hop{}", i + 1);
            server.mock(move |when, then| {
                when.method(GET).path(from.as_str());
                then.status(302).header("Location", to.as_str());
            });
        }

        let options = FetchOptions {
            max_redirects: 2,
            ..quick_options()
        };
        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher.fetch(&server.url("/hop0"), &options).await;

        assert_eq!(result.error, Some(FetchError::RedirectLoop));
    }

    #[tokio::test]
    async fn test_connection_refused_is_retried_then_fails() {
        let options = FetchOptions {
            max_retries: 1,
            ..quick_options()
        };
        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher.fetch("http://127.0.0.1:1/", &options).await;

        assert_eq!(result.attempts, 2);
        assert!(matches!(result.error, Some(FetchError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_unresolvable_host_fails_without_retry() {
        let options = FetchOptions {
            max_retries: 2,
            ..quick_options()
        };
        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher.fetch("http://no-such-host.invalid/", &options).await;

        assert_eq!(result.attempts, 1);
        assert!(matches!(result.error, Some(FetchError::ConnectionFailed(_))));
        assert_eq!(result.http_status, None);
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let fetcher = HttpFetcher::new().unwrap();
        for url in ["not a url", "ftp://example.com/file"] {
            let result = fetcher.fetch(url, &quick_options()).await;
            assert!(matches!(result.error, Some(FetchError::InvalidUrl(_))));
            assert_eq!(result.attempts, 0);
        }
    }

    #[tokio::test]
    async fn test_robots_disallow() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/robots.txt");
            then.status(200).body("User-agent: *\nDisallow: /private\n");
        });
        let private = server.mock(|when, then| {
            when.method(GET).path("/private/page");
            then.status(200).body("secret");
        });

        let options = FetchOptions {
            respect_robots: true,
            ..quick_options()
        };
        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher.fetch(&server.url("/private/page"), &options).await;

        private.assert_hits(0);
        assert_eq!(result.error, Some(FetchError::RobotsDisallowed));
    }
}
