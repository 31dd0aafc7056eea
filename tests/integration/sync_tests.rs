//! End-to-end synchronization tests against a mock marketplace

use crate::common::*;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use domain_catalog::config::SyncConfig;
use domain_catalog::state::RunOutcome;
use domain_catalog::sync::{SyncError, SyncOptions};
use domain_catalog::{CatalogService, DomainQuery, SyncMode};
use serde_json::json;
use std::time::{Duration, Instant};
use wiremock::{MockServer, ResponseTemplate};

fn always_stale(server: &MockServer) -> domain_catalog::Config {
    let mut config = test_config(server);
    config.sync.stale_after_secs = 0;
    config
}

fn all_domains(service: &CatalogService) -> Vec<String> {
    let page = service
        .query_domains(&DomainQuery {
            page_size: 500,
            ..DomainQuery::default()
        })
        .unwrap();
    page.rows.into_iter().map(|r| r.domain).collect()
}

#[tokio::test]
async fn test_short_page_completes_run() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_body(rows("a", 100))).await;
    mount_page(&server, 2, page_body(rows("b", 100))).await;
    mount_page(&server, 3, page_body(rows("c", 40))).await;
    forbid_page(&server, 4).await;

    let service = service(&test_config(&server));
    let report = service.trigger_sync(false, false).wait().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.mode, SyncMode::Full);
    assert_eq!(report.pages, 3);
    assert_eq!(report.raw_rows, 240);
    assert_eq!(report.normalized_rows, 240);
    assert_eq!(report.last_page, Some(3));

    let status = service.sync_status().unwrap();
    assert_eq!(status.record_count, 240);
    assert_eq!(status.last_page, Some(3));
    assert_eq!(status.cursor_page, 1);
    assert_eq!(status.total_pages, None);
    assert_eq!(status.sync_mode, SyncMode::Incremental);
    assert_eq!(status.last_outcome, Some(RunOutcome::Completed));
    assert_eq!(status.last_run_pages, Some(3));
    assert!(status.last_sync_at.is_some());
    assert!(status.last_error.is_none());
    assert!(!status.is_syncing);
}

#[tokio::test]
async fn test_reported_total_ends_run() {
    let server = MockServer::start().await;
    let body = |prefix: &str| json!({"items": rows(prefix, 100), "meta": {"total": 200}});
    mount_page(&server, 1, body("a")).await;
    mount_page(&server, 2, body("b")).await;
    forbid_page(&server, 3).await;

    let service = service(&test_config(&server));
    let report = service.trigger_sync(false, false).wait().await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.pages, 2);
    assert_eq!(service.sync_status().unwrap().total_pages, None);
}

#[tokio::test]
async fn test_retry_after_is_honored() {
    let server = MockServer::start().await;
    page_mock(
        1,
        ResponseTemplate::new(429).insert_header("Retry-After", "1"),
    )
    .up_to_n_times(1)
    .expect(1)
    .mount(&server)
    .await;
    mount_page(&server, 1, page_body(rows("a", 5))).await;

    let service = service(&test_config(&server));
    let started = Instant::now();
    let report = service.trigger_sync(false, false).wait().await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(service.sync_status().unwrap().record_count, 5);
}

#[tokio::test]
async fn test_exhausted_rate_limit_sets_cooldown() {
    let server = MockServer::start().await;
    page_mock(1, ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let service = service(&test_config(&server));
    let err = service.trigger_sync(false, false).wait().await.unwrap_err();
    assert_eq!(err, SyncError::RateLimited { attempts: 3 });

    let status = service.sync_status().unwrap();
    let not_before = status.next_sync_not_before.expect("cooldown recorded");
    let expected: DateTime<Utc> = Utc::now() + ChronoDuration::hours(2);
    assert!((expected - not_before).num_seconds().abs() < 60);
    assert!(status.last_error.unwrap().contains("rate limit"));
    assert_eq!(status.last_outcome, Some(RunOutcome::Failed));

    // The cooldown declines the next scheduled run without calling upstream
    let report = service.trigger_sync(false, false).wait().await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Skipped);
    assert!(report.skip_reason.unwrap().contains("cooldown"));
}

#[tokio::test]
async fn test_oversized_cooldown_is_still_recorded() {
    let server = MockServer::start().await;
    page_mock(1, ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = test_config(&server);
    config.sync.rate_limit_cooldown_secs = 10_000_000_000_000;
    let service = service(&config);

    let err = service.trigger_sync(false, false).wait().await.unwrap_err();
    assert_eq!(err, SyncError::RateLimited { attempts: 3 });

    let status = service.sync_status().unwrap();
    assert_eq!(status.last_outcome, Some(RunOutcome::Failed));
    assert!(status.last_error.is_some());
    let not_before = status.next_sync_not_before.expect("cooldown recorded");
    assert!(not_before > Utc::now() + ChronoDuration::days(365));
}

#[tokio::test]
async fn test_oversized_staleness_keeps_catalog_fresh() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_body(rows("a", 10))).await;

    let mut config = test_config(&server);
    config.sync.stale_after_secs = 10_000_000_000_000_000;
    let service = service(&config);

    let first = service.trigger_sync(false, false).wait().await.unwrap();
    assert_eq!(first.outcome, RunOutcome::Completed);

    let second = service.trigger_sync(false, false).wait().await.unwrap();
    assert_eq!(second.outcome, RunOutcome::Skipped);
    assert!(second.skip_reason.unwrap().contains("fresh"));
}

#[tokio::test]
async fn test_server_errors_fail_without_cooldown() {
    let server = MockServer::start().await;
    page_mock(1, ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let service = service(&test_config(&server));
    let err = service.trigger_sync(false, false).wait().await.unwrap_err();
    assert!(matches!(err, SyncError::UpstreamUnavailable(_)));

    let status = service.sync_status().unwrap();
    assert!(status.next_sync_not_before.is_none());
    assert!(status.last_error.unwrap().contains("503"));
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    page_mock(1, ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let service = service(&test_config(&server));
    let err = service.trigger_sync(false, false).wait().await.unwrap_err();
    match err {
        SyncError::UpstreamRejected(message) => assert!(message.contains("401")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_fresh_catalog_skips_until_forced() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_body(rows("a", 10))).await;

    let service = service(&test_config(&server));
    service.trigger_sync(false, false).wait().await.unwrap();

    let skipped = service.trigger_sync(false, false).wait().await.unwrap();
    assert_eq!(skipped.outcome, RunOutcome::Skipped);
    assert!(skipped.skip_reason.unwrap().contains("fresh"));

    let forced = service.trigger_sync(true, false).wait().await.unwrap();
    assert_eq!(forced.outcome, RunOutcome::Completed);
    assert_eq!(forced.mode, SyncMode::Full);
}

#[tokio::test]
async fn test_forced_reset_selects_full_mode() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_body(rows("a", 10))).await;

    let service = service(&always_stale(&server));
    service.trigger_sync(false, false).wait().await.unwrap();
    assert_eq!(service.sync_status().unwrap().sync_mode, SyncMode::Incremental);

    let report = service.trigger_sync(false, true).wait().await.unwrap();
    assert_eq!(report.mode, SyncMode::Full);
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(service.sync_status().unwrap().record_count, 10);
}

#[tokio::test]
async fn test_page_budget_interrupts_and_resumes() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_body(rows("a", 100))).await;
    mount_page(&server, 2, page_body(rows("b", 100))).await;
    mount_page(&server, 3, page_body(rows("c", 100))).await;
    mount_page(&server, 4, page_body(rows("d", 40))).await;

    let mut config = test_config(&server);
    config.sync = SyncConfig {
        max_pages_per_run: 2,
        inter_page_delay_ms: 0,
        ..SyncConfig::default()
    };
    let service = service(&config);

    let first = service.trigger_sync(false, false).wait().await.unwrap();
    assert_eq!(first.outcome, RunOutcome::Interrupted);
    assert_eq!(first.pages, 2);

    let status = service.sync_status().unwrap();
    assert_eq!(status.cursor_page, 3);
    assert_eq!(status.last_outcome, Some(RunOutcome::Interrupted));
    assert!(status.last_sync_at.is_none());

    let second = service.trigger_sync(false, false).wait().await.unwrap();
    assert_eq!(second.outcome, RunOutcome::Completed);
    assert_eq!(second.start_page, 3);
    assert_eq!(second.last_page, Some(4));

    let status = service.sync_status().unwrap();
    assert_eq!(status.record_count, 340);
    assert_eq!(status.cursor_page, 1);
}

#[tokio::test]
async fn test_resume_cursor_bypasses_staleness() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_body(rows("a", 100))).await;
    mount_page(&server, 2, page_body(rows("b", 100))).await;
    mount_page(&server, 3, page_body(rows("c", 10))).await;

    let mut config = test_config(&server);
    config.sync.max_pages_per_run = 2;
    let service = service(&config);

    // Two budgeted runs finish a first pass, so the catalog counts as fresh
    service.trigger_sync(false, false).wait().await.unwrap();
    service.trigger_sync(false, false).wait().await.unwrap();
    assert!(service.sync_status().unwrap().last_sync_at.is_some());

    // A forced pass is interrupted by the budget...
    let forced = service.trigger_sync(true, false).wait().await.unwrap();
    assert_eq!(forced.outcome, RunOutcome::Interrupted);

    // ...and the next scheduled trigger resumes despite the fresh sync
    let resumed = service.trigger_sync(false, false).wait().await.unwrap();
    assert_eq!(resumed.outcome, RunOutcome::Completed);
    assert_eq!(resumed.start_page, 3);
}

#[tokio::test]
async fn test_incremental_run_stops_at_watermark() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_body(rows_created("old", 100, "2024-01-10T00:00:00Z"))).await;
    mount_page(&server, 2, page_body(rows_created("older", 40, "2024-01-05T00:00:00Z"))).await;

    let service = service(&always_stale(&server));
    let full = service.trigger_sync(false, false).wait().await.unwrap();
    assert_eq!(full.mode, SyncMode::Full);

    let status = service.sync_status().unwrap();
    assert_eq!(status.sync_mode, SyncMode::Incremental);
    assert_eq!(
        status.source_created_at_max.map(|t| t.to_rfc3339()),
        Some("2024-01-10T00:00:00+00:00".to_string())
    );

    // Newest listings first, then the ones already mirrored
    server.reset().await;
    mount_page(&server, 1, page_body(rows_created("new", 100, "2024-03-01T00:00:00Z"))).await;
    mount_page(&server, 2, page_body(rows_created("old", 100, "2024-01-10T00:00:00Z"))).await;
    forbid_page(&server, 3).await;

    let incremental = service.trigger_sync(false, false).wait().await.unwrap();
    assert_eq!(incremental.mode, SyncMode::Incremental);
    assert_eq!(incremental.outcome, RunOutcome::Completed);
    assert_eq!(incremental.pages, 2);

    let status = service.sync_status().unwrap();
    assert_eq!(status.record_count, 240);
    assert_eq!(
        status.source_created_at_max.map(|t| t.to_rfc3339()),
        Some("2024-03-01T00:00:00+00:00".to_string())
    );
}

#[tokio::test]
async fn test_watermark_computed_from_store_when_missing() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_body(rows_created("a", 100, "2024-01-10T00:00:00Z"))).await;
    mount_page(&server, 2, page_body(rows_created("b", 100, "2024-01-08T00:00:00Z"))).await;
    page_mock(3, ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = always_stale(&server);
    config.sync.max_pages_per_run = 2;
    let service = service(&config);

    // An interrupted pass never records a watermark
    let first = service.trigger_sync(false, false).wait().await.unwrap();
    assert_eq!(first.outcome, RunOutcome::Interrupted);
    assert!(service.sync_status().unwrap().source_created_at_max.is_none());

    // The resuming run derives it from the stored rows before fetching page 3
    service.trigger_sync(false, false).wait().await.unwrap_err();
    let status = service.sync_status().unwrap();
    assert_eq!(status.last_outcome, Some(RunOutcome::Failed));
    assert_eq!(status.cursor_page, 3);
    assert_eq!(
        status.source_created_at_max.map(|t| t.to_rfc3339()),
        Some("2024-01-10T00:00:00+00:00".to_string())
    );

    // Completing on older rows keeps the derived watermark
    server.reset().await;
    mount_page(&server, 3, page_body(rows_created("c", 40, "2024-01-05T00:00:00Z"))).await;
    let resumed = service.trigger_sync(false, false).wait().await.unwrap();
    assert_eq!(resumed.outcome, RunOutcome::Completed);
    assert_eq!(resumed.start_page, 3);
    assert_eq!(
        service
            .sync_status()
            .unwrap()
            .source_created_at_max
            .map(|t| t.to_rfc3339()),
        Some("2024-01-10T00:00:00+00:00".to_string())
    );

    // An incremental run converges on the first page at or below it
    server.reset().await;
    mount_page(&server, 1, page_body(rows_created("new", 100, "2024-03-01T00:00:00Z"))).await;
    mount_page(&server, 2, page_body(rows_created("a", 100, "2024-01-10T00:00:00Z"))).await;
    forbid_page(&server, 3).await;

    let incremental = service.trigger_sync(false, false).wait().await.unwrap();
    assert_eq!(incremental.mode, SyncMode::Incremental);
    assert_eq!(incremental.outcome, RunOutcome::Completed);
    assert_eq!(incremental.pages, 2);
    assert_eq!(service.sync_status().unwrap().record_count, 340);
}

#[tokio::test]
async fn test_repeated_sync_is_idempotent() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_body(rows("a", 100))).await;
    mount_page(&server, 2, page_body(rows("b", 30))).await;

    let service = service(&always_stale(&server));
    service.trigger_sync(false, false).wait().await.unwrap();
    let first = service.query_domains(&DomainQuery::default()).unwrap();

    service.trigger_sync(false, false).wait().await.unwrap();
    let second = service.query_domains(&DomainQuery::default()).unwrap();

    let strip = |page: domain_catalog::QueryPage| {
        page.rows
            .into_iter()
            .map(|mut r| {
                r.updated_at = None;
                r
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(first.total, 130);
    assert_eq!(second.total, 130);
    assert_eq!(strip(first), strip(second));
}

#[tokio::test]
async fn test_latest_payload_wins() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        1,
        page_body(vec![json!({"domain": "shop.com", "seller": "acme", "price": 10})]),
    )
    .await;

    let service = service(&always_stale(&server));
    service.trigger_sync(false, false).wait().await.unwrap();

    server.reset().await;
    mount_page(
        &server,
        1,
        page_body(vec![json!({"domain": "shop.com", "precio": "12,50"})]),
    )
    .await;
    service.trigger_sync(false, false).wait().await.unwrap();

    let page = service.query_domains(&DomainQuery::default()).unwrap();
    assert_eq!(page.rows.len(), 1);
    let record = &page.rows[0];
    assert_eq!(record.price, Some(12.5));
    assert!(record.raw.get("seller").is_none());
    assert_eq!(all_domains(&service), vec!["shop.com"]);
}

#[tokio::test]
async fn test_concurrent_triggers_share_one_run() {
    let server = MockServer::start().await;
    page_mock(
        1,
        ResponseTemplate::new(200)
            .set_body_json(page_body(rows("a", 10)))
            .set_delay(Duration::from_millis(300)),
    )
    .expect(1)
    .mount(&server)
    .await;

    let service = service(&test_config(&server));
    let first = service.trigger_sync(false, false);
    let second = service.trigger_sync(true, true);
    assert_eq!(first.id(), second.id());
    assert!(service.sync_status().unwrap().is_syncing);

    let (a, b) = tokio::join!(first.wait(), second.wait());
    assert_eq!(a.unwrap(), b.unwrap());
    assert!(!service.sync_status().unwrap().is_syncing);
}

#[tokio::test]
async fn test_auto_refresh_survives_failures_until_shutdown() {
    let server = MockServer::start().await;
    page_mock(1, ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let service = service(&test_config(&server));
    let scheduler = service.scheduler();
    scheduler.spawn_auto_refresh(Duration::from_millis(50));

    tokio::time::sleep(Duration::from_millis(400)).await;
    let requests = server.received_requests().await.unwrap().len();
    assert!(requests >= 3, "only {} refresh requests", requests);

    let status = service.sync_status().unwrap();
    assert_eq!(status.last_outcome, Some(RunOutcome::Failed));
    assert!(status.last_error.unwrap().contains("401"));

    scheduler.shutdown().await;
    assert!(!scheduler.is_syncing());

    let stopped_at = server.received_requests().await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), stopped_at);
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_run() {
    let server = MockServer::start().await;
    page_mock(
        1,
        ResponseTemplate::new(200)
            .set_body_json(page_body(rows("a", 10)))
            .set_delay(Duration::from_millis(200)),
    )
    .expect(1)
    .mount(&server)
    .await;

    let service = service(&test_config(&server));
    let scheduler = service.scheduler();
    let handle = scheduler.trigger(SyncOptions::default());
    assert!(scheduler.is_syncing());

    scheduler.shutdown().await;
    assert!(!scheduler.is_syncing());
    assert_eq!(service.sync_status().unwrap().record_count, 10);
    assert_eq!(handle.wait().await.unwrap().outcome, RunOutcome::Completed);
}
