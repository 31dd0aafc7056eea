//! Page Fetcher
//!
//! Retrieves one upstream catalog page at a time, retrying rate limits and
//! transient failures according to a [`RetryPolicy`].

mod fetcher;
mod retry;
mod totals;

pub use fetcher::{build_http_client, PageFetcher};
pub use retry::{parse_retry_after, RetryPolicy};
pub use totals::{find_total_count, find_total_pages, pages_for};

use serde_json::Value;
use thiserror::Error;

/// Errors returned by the page fetcher
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Upstream rate limit persisted after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Upstream unavailable after {attempts} attempts: {message}")]
    UpstreamUnavailable { attempts: u32, message: String },

    #[error("Upstream rejected the request (HTTP {status}): {body}")]
    UpstreamRejected { status: u16, body: String },

    #[error("Upstream payload is not valid JSON: {0}")]
    InvalidPayload(String),

    #[error("Invalid upstream endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// One decoded upstream page
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// Raw rows as selected by the row extractor
    pub rows: Vec<Value>,

    /// Total record count, when the payload reports one
    pub total: Option<u64>,

    /// Total page count, when the payload reports one
    pub total_pages: Option<u32>,

    /// The page was full, so another page may follow
    pub has_more: bool,
}

impl FetchedPage {
    /// Total pages reported directly or derived from the total count
    pub fn pages_hint(&self, page_size: u32) -> Option<u32> {
        self.total_pages
            .or_else(|| self.total.map(|total| pages_for(total, page_size)))
    }
}
