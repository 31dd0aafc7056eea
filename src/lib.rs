//! Domain-Catalog: a locally cached mirror of a domain-marketplace catalog
//!
//! This crate ingests a paginated, schema-unstable upstream catalog, normalizes
//! each row into a [`DomainRecord`], keeps the result in a SQLite store, and
//! serves filtered queries and cached analytics from that store.

pub mod analytics;
pub mod config;
pub mod extract;
pub mod query;
pub mod service;
pub mod state;
pub mod storage;
pub mod sync;
pub mod upstream;

use thiserror::Error;

/// Main error type for Domain-Catalog operations
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] upstream::FetchError),

    #[error("Query error: {0}")]
    Query(#[from] query::QueryError),

    #[error("Sync failed: {0}")]
    Sync(#[from] sync::SyncError),

    #[error("A synchronization run is in progress")]
    SyncInProgress,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Missing API key: set upstream.api-key or {0}")]
    MissingApiKey(&'static str),
}

/// Result type alias for Domain-Catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use analytics::AnalyticsSnapshot;
pub use config::Config;
pub use extract::{extract_rows, normalize, DomainRecord};
pub use query::{Availability, DomainFilter, DomainQuery, QueryPage, SortKey};
pub use service::CatalogService;
pub use state::{SyncMode, SyncState};
