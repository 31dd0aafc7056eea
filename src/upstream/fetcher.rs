//! HTTP page fetcher for the marketplace catalog
//!
//! This module handles all requests to the upstream API, including:
//! - Building the HTTP client with the configured user agent and timeout
//! - Authenticated GET requests for a single catalog page
//! - Retry logic for rate limiting, server errors and transport failures
//! - Decoding the payload into raw rows plus pagination hints

use crate::config::UpstreamConfig;
use crate::extract::extract_rows;
use crate::upstream::retry::{parse_retry_after, RetryPolicy};
use crate::upstream::totals::{find_total_count, find_total_pages};
use crate::upstream::{FetchError, FetchedPage};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Longest upstream error body kept in error messages
const MAX_ERROR_BODY: usize = 200;

/// Builds an HTTP client for the upstream API
///
/// # Example
///
/// ```no_run
/// use domain_catalog::config::UpstreamConfig;
/// use domain_catalog::upstream::build_http_client;
///
/// let config = UpstreamConfig {
///     base_url: "https://api.example.com/v1/domains".to_string(),
///     api_key: Some("secret".to_string()),
///     api_key_header: "X-API-Key".to_string(),
///     page_size: 100,
///     timeout_secs: 30,
///     user_agent: "domain-catalog/0.1".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UpstreamConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Outcome of a single HTTP attempt
#[derive(Debug)]
enum Attempt {
    RateLimited(Option<Duration>),
    ServerError(u16),
    Transport(String),
    Rejected(u16, String),
}

/// Fetches catalog pages from the upstream API
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    endpoint: Url,
    api_key_header: String,
    api_key: String,
    policy: RetryPolicy,
}

impl PageFetcher {
    /// Creates a fetcher from upstream configuration
    ///
    /// The API key must already be resolved (see [`crate::config::load_config`]).
    pub fn new(config: &UpstreamConfig, policy: RetryPolicy) -> Result<Self, FetchError> {
        let endpoint = Url::parse(&config.base_url)
            .map_err(|e| FetchError::InvalidEndpoint(format!("{}: {}", config.base_url, e)))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| FetchError::InvalidEndpoint("no API key configured".to_string()))?;

        Ok(Self {
            client: build_http_client(config)?,
            endpoint,
            api_key_header: config.api_key_header.clone(),
            api_key,
            policy,
        })
    }

    /// Fetches one page, retrying transient failures
    ///
    /// # Retry Logic
    ///
    /// | Condition        | Action                                  |
    /// |------------------|-----------------------------------------|
    /// | HTTP 2xx         | Decode payload                          |
    /// | HTTP 429         | Sleep `Retry-After` or backoff, retry   |
    /// | HTTP 5xx         | Sleep backoff, retry                    |
    /// | Timeout/connect  | Sleep backoff, retry                    |
    /// | Other non-2xx    | Immediate → `UpstreamRejected`          |
    /// | Undecodable body | Immediate → `InvalidPayload`            |
    ///
    /// After `max_attempts` the last retryable condition is returned as
    /// `RateLimited` or `UpstreamUnavailable`.
    pub async fn fetch_page(&self, page: u32, page_size: u32) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let failure = match self.attempt(page, page_size).await {
                Ok(body) => return decode_page(&body, page_size),
                Err(failure) => failure,
            };

            let delay = match failure {
                Attempt::Rejected(status, body) => {
                    return Err(FetchError::UpstreamRejected { status, body });
                }
                Attempt::RateLimited(retry_after) => {
                    if !self.policy.can_retry(attempt) {
                        return Err(FetchError::RateLimited { attempts: attempt });
                    }
                    let delay = self.policy.rate_limit_delay(attempt, retry_after);
                    tracing::warn!(
                        "Rate limited on page {} (attempt {}/{}), retrying in {:?}",
                        page,
                        attempt,
                        self.policy.max_attempts,
                        delay
                    );
                    delay
                }
                Attempt::ServerError(status) => {
                    if !self.policy.can_retry(attempt) {
                        return Err(FetchError::UpstreamUnavailable {
                            attempts: attempt,
                            message: format!("HTTP {}", status),
                        });
                    }
                    let delay = self.policy.server_error_delay(attempt);
                    tracing::warn!(
                        "Upstream returned HTTP {} for page {} (attempt {}/{}), retrying in {:?}",
                        status,
                        page,
                        attempt,
                        self.policy.max_attempts,
                        delay
                    );
                    delay
                }
                Attempt::Transport(message) => {
                    if !self.policy.can_retry(attempt) {
                        return Err(FetchError::UpstreamUnavailable {
                            attempts: attempt,
                            message,
                        });
                    }
                    let delay = self.policy.server_error_delay(attempt);
                    tracing::warn!(
                        "Request for page {} failed: {} (attempt {}/{}), retrying in {:?}",
                        page,
                        message,
                        attempt,
                        self.policy.max_attempts,
                        delay
                    );
                    delay
                }
            };

            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, page: u32, page_size: u32) -> Result<String, Attempt> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("page", page), ("per_page", page_size)])
            .header(self.api_key_header.as_str(), self.api_key.as_str())
            .send()
            .await
            .map_err(|e| Attempt::Transport(e.to_string()))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(Attempt::RateLimited(retry_after));
        }

        if status.is_server_error() {
            return Err(Attempt::ServerError(status.as_u16()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Attempt::Rejected(status.as_u16(), truncate(&body)));
        }

        response
            .text()
            .await
            .map_err(|e| Attempt::Transport(e.to_string()))
    }
}

/// Decodes a successful response body
fn decode_page(body: &str, page_size: u32) -> Result<FetchedPage, FetchError> {
    let payload: serde_json::Value =
        serde_json::from_str(body).map_err(|e| FetchError::InvalidPayload(e.to_string()))?;

    let rows = extract_rows(&payload);
    let has_more = rows.len() >= page_size as usize;

    Ok(FetchedPage {
        total: find_total_count(&payload),
        total_pages: find_total_pages(&payload),
        has_more,
        rows,
    })
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((end, _)) => format!("{}...", &body[..end]),
        None => body.to_string(),
    }
}
