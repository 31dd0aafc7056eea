//! Shared fixtures for the integration tests

use domain_catalog::config::{AnalyticsConfig, Config, StorageConfig, SyncConfig, UpstreamConfig};
use domain_catalog::storage::{share, SqliteStorage};
use domain_catalog::upstream::RetryPolicy;
use domain_catalog::CatalogService;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ENDPOINT: &str = "/v1/domains";
pub const API_KEY: &str = "test-key";
pub const PAGE_SIZE: u32 = 100;

/// Configuration pointing at the mock server, without inter-page delays
pub fn test_config(server: &MockServer) -> Config {
    Config {
        upstream: UpstreamConfig {
            base_url: format!("{}{}", server.uri(), ENDPOINT),
            api_key: Some(API_KEY.to_string()),
            api_key_header: "X-API-Key".to_string(),
            page_size: PAGE_SIZE,
            timeout_secs: 5,
            user_agent: "domain-catalog-tests".to_string(),
        },
        sync: SyncConfig {
            inter_page_delay_ms: 0,
            ..SyncConfig::default()
        },
        storage: StorageConfig {
            database_path: ":memory:".to_string(),
        },
        analytics: AnalyticsConfig::default(),
    }
}

/// Default backoff shape shrunk to milliseconds
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        rate_limit_base: Duration::from_millis(1),
        rate_limit_cap: Duration::from_millis(5),
        retry_after_min: Duration::from_millis(1),
        retry_after_max: Duration::from_secs(120),
        server_error_base: Duration::from_millis(1),
        server_error_cap: Duration::from_millis(5),
    }
}

/// A service over a fresh in-memory store
pub fn service(config: &Config) -> CatalogService {
    let store = share(SqliteStorage::new_in_memory().expect("in-memory store"));
    CatalogService::with_store(config, store, fast_policy(3)).expect("service")
}

/// `count` rows named `{prefix}-NNN.com`
pub fn rows(prefix: &str, count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "domain_name": format!("{}-{:03}.com", prefix, i),
                "price": i,
                "available": i % 2 == 0,
            })
        })
        .collect()
}

/// `count` rows carrying a creation timestamp
pub fn rows_created(prefix: &str, count: usize, created_at: &str) -> Vec<Value> {
    rows(prefix, count)
        .into_iter()
        .map(|mut row| {
            row["created_at"] = json!(created_at);
            row
        })
        .collect()
}

/// Wraps rows the way the marketplace does
pub fn page_body(rows: Vec<Value>) -> Value {
    json!({"status": "ok", "result": {"data": rows, "page_info": {"per_page": PAGE_SIZE}}})
}

fn page_request(page: u32) -> wiremock::MockBuilder {
    Mock::given(method("GET"))
        .and(path(ENDPOINT))
        .and(query_param("page", page.to_string()))
        .and(query_param("per_page", PAGE_SIZE.to_string()))
        .and(header("X-API-Key", API_KEY))
}

/// Serves `body` for `page`
pub async fn mount_page(server: &MockServer, page: u32, body: Value) {
    page_request(page)
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Fails the test if `page` is ever requested
pub async fn forbid_page(server: &MockServer, page: u32) {
    page_request(page)
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(Vec::new())))
        .expect(0)
        .mount(server)
        .await;
}

/// Serves `response` for `page`
pub fn page_mock(page: u32, response: ResponseTemplate) -> Mock {
    page_request(page).respond_with(response)
}
