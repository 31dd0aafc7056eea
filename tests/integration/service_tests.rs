//! Catalog service tests: queries, analytics caching, resets and restarts

use crate::common::*;
use domain_catalog::query::{DomainSort, FixedColumn, SortDirection};
use domain_catalog::state::RunOutcome;
use domain_catalog::sync::SyncOptions;
use domain_catalog::{
    Availability, CatalogError, CatalogService, DomainFilter, DomainQuery, SortKey,
};
use serde_json::json;
use std::time::Duration;
use wiremock::{MockServer, ResponseTemplate};

async fn seeded_service(server: &MockServer) -> CatalogService {
    mount_page(
        server,
        1,
        page_body(vec![
            json!({"domain": "alpha.com", "disponible": "si", "precio": "12,50", "seller": "Acme", "visits": 300, "tech_stack": "react,node", "nivel": "alto"}),
            json!({"domain": "beta.com", "available": "no", "price": 40, "seller": "Globex", "visits": 10, "tech_stack": ["php"], "nivel": "bajo"}),
            json!({"domain": "gamma.io", "available": true, "price": 5, "seller": "acme labs", "visits": 120, "techStack": "[\"react\"]"}),
            json!({"domain": "delta.net", "seller": "Initech"}),
            json!({"note": "no domain here"}),
        ]),
    )
    .await;

    let service = service(&test_config(server));
    service.trigger_sync(false, false).wait().await.unwrap();
    service
}

#[tokio::test]
async fn test_query_filters_and_sorts() {
    let server = MockServer::start().await;
    let service = seeded_service(&server).await;

    let all = service.query_domains(&DomainQuery::default()).unwrap();
    assert_eq!(all.total, 4);
    assert!(all.discovered_fields.contains(&"seller".to_string()));
    assert!(all.discovered_fields.contains(&"visits".to_string()));

    let alpha = all.rows.iter().find(|r| r.domain == "alpha.com").unwrap();
    assert_eq!(alpha.available, Some(true));
    assert_eq!(alpha.price, Some(12.5));
    assert_eq!(alpha.tld, "com");

    let acme = service
        .query_domains(&DomainQuery {
            filter: DomainFilter::default().with_column("seller", "ACME"),
            ..DomainQuery::default()
        })
        .unwrap();
    let domains: Vec<_> = acme.rows.iter().map(|r| r.domain.as_str()).collect();
    assert_eq!(domains, vec!["alpha.com", "gamma.io"]);

    let unknown = service
        .query_domains(&DomainQuery {
            filter: DomainFilter {
                availability: Some(Availability::Unknown),
                ..DomainFilter::default()
            },
            ..DomainQuery::default()
        })
        .unwrap();
    assert_eq!(unknown.total, 1);
    assert_eq!(unknown.rows[0].domain, "delta.net");

    let by_visits = service
        .query_domains(&DomainQuery {
            sort: DomainSort::new("visits".parse::<SortKey>().unwrap(), SortDirection::Desc),
            ..DomainQuery::default()
        })
        .unwrap();
    let domains: Vec<_> = by_visits.rows.iter().map(|r| r.domain.as_str()).collect();
    assert_eq!(domains, vec!["alpha.com", "gamma.io", "beta.com", "delta.net"]);

    let by_price = service
        .query_domains(&DomainQuery {
            page: 1,
            page_size: 2,
            filter: DomainFilter {
                tld: Some(".COM".to_string()),
                ..DomainFilter::default()
            },
            sort: DomainSort::new(SortKey::Column(FixedColumn::Price), SortDirection::Asc),
        })
        .unwrap();
    assert_eq!(by_price.total, 2);
    assert!(!by_price.has_more);
    assert_eq!(by_price.rows[0].domain, "alpha.com");
}

#[tokio::test]
async fn test_rejects_unsafe_sort_key() {
    assert!("visits; DROP TABLE domains".parse::<SortKey>().is_err());

    let server = MockServer::start().await;
    let service = seeded_service(&server).await;
    let result = service.query_domains(&DomainQuery {
        filter: DomainFilter::default().with_column("a\"b", "x"),
        ..DomainQuery::default()
    });
    assert!(matches!(result, Err(CatalogError::Query(_))));
}

#[tokio::test]
async fn test_analytics_cache_follows_syncs() {
    let server = MockServer::start().await;
    let service = seeded_service(&server).await;
    let engine = service.analytics_engine();

    let first = service.analytics(&DomainFilter::default()).unwrap();
    let second = service.analytics(&DomainFilter::default()).unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.computations(), 1);

    assert_eq!(first.total, 4);
    assert_eq!(first.available, 2);
    assert_eq!(first.tech_stack[0].label, "react");
    assert_eq!(first.tech_stack[0].count, 2);
    assert!(first.top_levels.iter().any(|l| l.label == "unknown" && l.count == 2));

    // A completed sync invalidates every cached snapshot
    service.trigger_sync(true, false).wait().await.unwrap();
    let third = service.analytics(&DomainFilter::default()).unwrap();
    assert_eq!(engine.computations(), 2);
    assert_eq!(third, first);

    service.reset_catalog().unwrap();
    let empty = service.analytics(&DomainFilter::default()).unwrap();
    assert_eq!(engine.computations(), 3);
    assert_eq!(empty.total, 0);
    assert!(empty.heatmap.cells.is_empty());
}

#[tokio::test]
async fn test_reset_refused_while_syncing() {
    let server = MockServer::start().await;
    page_mock(
        1,
        ResponseTemplate::new(200)
            .set_body_json(page_body(rows("a", 3)))
            .set_delay(Duration::from_millis(200)),
    )
    .mount(&server)
    .await;

    let service = service(&test_config(&server));
    let handle = service.trigger_sync(false, false);
    assert!(matches!(
        service.reset_catalog(),
        Err(CatalogError::SyncInProgress)
    ));

    assert!(service.scheduler().while_idle(|| ()).is_none());

    handle.wait().await.unwrap();
    service.reset_catalog().unwrap();

    let status = service.sync_status().unwrap();
    assert_eq!(status.record_count, 0);
    assert!(status.last_sync_at.is_none());
    assert_eq!(status.cursor_page, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_trigger_waits_for_reset_in_progress() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_body(rows("a", 3))).await;

    let service = service(&test_config(&server));
    let scheduler = service.scheduler().clone();
    let runtime = tokio::runtime::Handle::current();
    let (tx, rx) = std::sync::mpsc::channel();

    // A trigger issued while the idle section runs cannot start until it ends
    let blocked = service.scheduler().while_idle(|| {
        std::thread::spawn(move || {
            let _runtime = runtime.enter();
            tx.send(scheduler.trigger(SyncOptions::default())).unwrap();
        });
        rx.recv_timeout(Duration::from_millis(150)).is_err()
    });
    assert_eq!(blocked, Some(true));

    let handle = rx.recv().unwrap();
    let report = handle.wait().await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(service.sync_status().unwrap().record_count, 3);
}

#[tokio::test]
async fn test_restart_resumes_from_persisted_cursor() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page_body(rows("a", 100))).await;
    mount_page(&server, 2, page_body(rows("b", 20))).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&server);
    config.storage.database_path = dir.path().join("catalog.db").display().to_string();
    config.sync.max_pages_per_run = 1;

    {
        let service = CatalogService::open(&config).unwrap();
        let report = service.trigger_sync(false, false).wait().await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Interrupted);
    }

    let service = CatalogService::open(&config).unwrap();
    let status = service.sync_status().unwrap();
    assert_eq!(status.cursor_page, 2);
    assert_eq!(status.record_count, 100);

    let report = service.trigger_sync(false, false).wait().await.unwrap();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.start_page, 2);
    assert_eq!(service.sync_status().unwrap().record_count, 120);
}
