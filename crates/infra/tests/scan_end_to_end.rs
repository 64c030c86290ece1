//! End-to-end scan through the SP-API fetcher against a mock server.

mod support;

use std::sync::Arc;
use std::time::Duration;

use sellerscan_common::MockClock;
use sellerscan_core::{ResultSink, ScanOrchestrator};
use sellerscan_domain::{FailureKind, JobStatus, ScanConfig, ScanRequest};
use sellerscan_infra::database::InMemoryResultSink;
use sellerscan_infra::sp_api::{ItemOperation, SpApiItemFetcher};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{client_for, unthrottled};

fn catalog_path(asin: &str) -> String {
    format!("/catalog/2022-04-01/items/{asin}")
}

fn serial_config() -> ScanConfig {
    ScanConfig { rate_limit: 1.0, jitter_ms: 0, max_retries: 3, concurrency: 1 }
}

#[tokio::test]
async fn test_scan_recovers_from_throttled_item() {
    let server = MockServer::start().await;
    let clock = MockClock::new();

    Mock::given(method("GET"))
        .and(path(catalog_path("A2")))
        .respond_with(ResponseTemplate::new(429).set_body_string("QuotaExceeded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    for asin in ["A1", "A2", "A3"] {
        Mock::given(method("GET"))
            .and(path(catalog_path(asin)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"asin": asin})))
            .mount(&server)
            .await;
    }

    let client = Arc::new(client_for(&server.uri(), &clock, unthrottled()));
    let sink = Arc::new(InMemoryResultSink::new());
    let orchestrator = ScanOrchestrator::new(
        sink.clone(),
        Arc::new(SpApiItemFetcher::new(client, ItemOperation::CatalogItem)),
    )
    .with_clock(clock.shared())
    .with_seed(7);

    let identifiers = vec!["A1".to_string(), "A2".to_string(), "A3".to_string()];
    let job_id =
        orchestrator.start_scan(ScanRequest::new(identifiers, serial_config())).await.unwrap();
    let job = orchestrator.wait(job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.counters.processed_count, 3);
    assert_eq!(job.counters.success_count, 3);
    assert_eq!(job.counters.failure_count, 0);

    // Two pacing gaps of one second plus one second of backoff after the 429.
    assert!(clock.total_slept() >= Duration::from_secs(3), "slept {:?}", clock.total_slept());

    let mut scanned: Vec<String> = sink
        .list_results(job_id)
        .await
        .unwrap()
        .into_iter()
        .map(|result| result.identifier)
        .collect();
    scanned.sort();
    assert_eq!(scanned, vec!["A1", "A2", "A3"]);
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_scan_records_item_failures_by_kind() {
    let server = MockServer::start().await;
    let clock = MockClock::new();

    Mock::given(method("GET"))
        .and(path(catalog_path("DENIED")))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(catalog_path("MISSING")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(catalog_path("GOOD")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"asin": "GOOD"})))
        .mount(&server)
        .await;

    let client = Arc::new(client_for(&server.uri(), &clock, unthrottled()));
    let sink = Arc::new(InMemoryResultSink::new());
    let orchestrator = ScanOrchestrator::new(
        sink.clone(),
        Arc::new(SpApiItemFetcher::new(client, ItemOperation::CatalogItem)),
    )
    .with_clock(clock.shared())
    .with_seed(11);

    let identifiers = vec!["DENIED".to_string(), "MISSING".to_string(), "GOOD".to_string()];
    let config = ScanConfig { rate_limit: 8.0, jitter_ms: 0, max_retries: 2, concurrency: 2 };
    let job_id = orchestrator.start_scan(ScanRequest::new(identifiers, config)).await.unwrap();
    let job = orchestrator.wait(job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.counters.success_count, 1);
    assert_eq!(job.counters.failure_count, 2);

    let failures = sink.list_failures(job_id).await.unwrap();
    let denied = failures.iter().find(|f| f.identifier == "DENIED").expect("denied recorded");
    let missing = failures.iter().find(|f| f.identifier == "MISSING").expect("missing recorded");
    assert_eq!(denied.kind, FailureKind::Auth);
    assert_eq!(denied.attempts, 1);
    assert_eq!(missing.kind, FailureKind::Upstream);
}
