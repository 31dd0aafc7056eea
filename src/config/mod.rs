//! Configuration module for Domain-Catalog
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use domain_catalog::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("catalog.toml")).unwrap();
//! println!("Page size: {}", config.upstream.page_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AnalyticsConfig, Config, StorageConfig, SyncConfig, UpstreamConfig, MAX_INTERVAL_SECS,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, API_KEY_ENV};
