use serde::Deserialize;

/// Main configuration structure for Domain-Catalog
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

/// Upstream marketplace API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Catalog endpoint accepting `page` / `per_page` query parameters
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// API key sent with every request (falls back to the environment)
    #[serde(rename = "api-key", default)]
    pub api_key: Option<String>,

    /// Header carrying the API key
    #[serde(rename = "api-key-header", default = "default_api_key_header")]
    pub api_key_header: String,

    /// Rows requested per page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header value
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Synchronization behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Page budget for a single run before it is interrupted
    #[serde(rename = "max-pages-per-run", default = "default_max_pages")]
    pub max_pages_per_run: u32,

    /// Pause between consecutive page fetches (milliseconds)
    #[serde(rename = "inter-page-delay-ms", default = "default_inter_page_delay")]
    pub inter_page_delay_ms: u64,

    /// Minimum age of the last completed sync before a scheduled run (seconds)
    #[serde(rename = "stale-after-secs", default = "default_two_hours")]
    pub stale_after_secs: u64,

    /// Cooldown applied after the upstream rate limit is exhausted (seconds)
    #[serde(rename = "rate-limit-cooldown-secs", default = "default_two_hours")]
    pub rate_limit_cooldown_secs: u64,

    /// Attempts per page before a retryable failure becomes fatal
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Interval of the background refresh loop (seconds); disabled when absent
    #[serde(rename = "auto-refresh-secs", default)]
    pub auto_refresh_secs: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_pages_per_run: default_max_pages(),
            inter_page_delay_ms: default_inter_page_delay(),
            stale_after_secs: default_two_hours(),
            rate_limit_cooldown_secs: default_two_hours(),
            max_attempts: default_max_attempts(),
            auto_refresh_secs: None,
        }
    }
}

/// Local store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Analytics cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// Lifetime of a cached snapshot regardless of version (seconds)
    #[serde(rename = "cache-ttl-secs", default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Length of every top-N breakdown
    #[serde(rename = "top-n", default = "default_top_n")]
    pub top_n: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            top_n: default_top_n(),
        }
    }
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("domain-catalog/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_pages() -> u32 {
    80
}

fn default_inter_page_delay() -> u64 {
    250
}

/// Upper bound for the staleness and cooldown intervals (ten years)
pub const MAX_INTERVAL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn default_two_hours() -> u64 {
    2 * 60 * 60
}

fn default_max_attempts() -> u32 {
    8
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_top_n() -> usize {
    10
}
