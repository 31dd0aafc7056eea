use crate::config::parser::API_KEY_ENV;
use crate::config::types::{
    AnalyticsConfig, Config, StorageConfig, SyncConfig, UpstreamConfig, MAX_INTERVAL_SECS,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_upstream_config(&config.upstream)?;
    validate_sync_config(&config.sync)?;
    validate_storage_config(&config.storage)?;
    validate_analytics_config(&config.analytics)?;
    Ok(())
}

/// Validates the upstream endpoint and paging settings
fn validate_upstream_config(config: &UpstreamConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::Validation(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    match config.api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => {}
        _ => return Err(ConfigError::MissingApiKey(API_KEY_ENV)),
    }

    if config.api_key_header.is_empty()
        || !config
            .api_key_header
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "api-key-header '{}' is not a valid header name",
            config.api_key_header
        )));
    }

    if config.page_size < 1 || config.page_size > 1000 {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and 1000, got {}",
            config.page_size
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates synchronization limits
fn validate_sync_config(config: &SyncConfig) -> Result<(), ConfigError> {
    if config.max_pages_per_run < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages-per-run must be >= 1, got {}",
            config.max_pages_per_run
        )));
    }

    if config.max_attempts < 1 || config.max_attempts > 20 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 20, got {}",
            config.max_attempts
        )));
    }

    for (name, secs) in [
        ("stale-after-secs", config.stale_after_secs),
        ("rate-limit-cooldown-secs", config.rate_limit_cooldown_secs),
    ] {
        if secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::Validation(format!(
                "{} must be <= {}, got {}",
                name, MAX_INTERVAL_SECS, secs
            )));
        }
    }

    if config.auto_refresh_secs == Some(0) {
        return Err(ConfigError::Validation(
            "auto-refresh-secs must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_analytics_config(config: &AnalyticsConfig) -> Result<(), ConfigError> {
    if config.top_n < 1 {
        return Err(ConfigError::Validation("top-n must be >= 1".to_string()));
    }
    Ok(())
}
