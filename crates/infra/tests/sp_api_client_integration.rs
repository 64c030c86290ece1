//! Integration tests for the resilient SP-API client
//!
//! Runs the client against a wiremock server with fixed credentials and a
//! mock clock, so backoff is recorded instead of slept.

mod support;

use std::time::Duration;

use sellerscan_common::{MockClock, RateLimitConfig};
use sellerscan_infra::sp_api::{ApiRequest, ItemCondition, SpApiError, SpApiErrorCategory};
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{client_for, unthrottled, ACCESS_TOKEN};

const CATALOG_PATH: &str = "/catalog/2022-04-01/items/B000TEST01";

async fn received(server: &MockServer) -> usize {
    server.received_requests().await.map(|requests| requests.len()).unwrap_or_default()
}

#[tokio::test]
async fn test_transient_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    let clock = MockClock::new();

    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"asin": "B000TEST01"})))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), &clock, unthrottled());
    let response = client.get_catalog_item("B000TEST01").await.expect("third attempt succeeds");

    assert_eq!(response.attempts, 3);
    assert_eq!(response.body["asin"], "B000TEST01");
    assert_eq!(received(&server).await, 3);
    assert_eq!(clock.recorded_sleeps(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
}

#[tokio::test]
async fn test_persistent_server_error_exhausts_budget() {
    let server = MockServer::start().await;
    let clock = MockClock::new();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(4)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), &clock, unthrottled());
    let failure = client.get_catalog_item("B000TEST01").await.expect_err("never succeeds");

    assert_eq!(failure.attempts, 4);
    assert_eq!(failure.error.category(), SpApiErrorCategory::Server);
    assert_eq!(clock.total_slept(), Duration::from_secs(1 + 2 + 4));
}

#[tokio::test]
async fn test_per_request_budget_overrides_client_default() {
    let server = MockServer::start().await;
    let clock = MockClock::new();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).set_body_string("QuotaExceeded"))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), &clock, unthrottled());
    let request = ApiRequest::get(CATALOG_PATH, "catalog").max_retries(1);
    let failure = client.request(&request).await.expect_err("throttled twice");

    assert_eq!(failure.attempts, 2);
    assert!(matches!(failure.error, SpApiError::RateLimitExceeded(_)));
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    let clock = MockClock::new();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Access to requested resource is denied."))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), &clock, unthrottled());
    let failure = client.get_catalog_item("B000TEST01").await.expect_err("forbidden");

    assert_eq!(failure.attempts, 1);
    assert!(matches!(failure.error, SpApiError::Auth(_)));
    assert!(clock.recorded_sleeps().is_empty());
}

#[tokio::test]
async fn test_not_found_is_upstream_without_retry() {
    let server = MockServer::start().await;
    let clock = MockClock::new();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("{\"errors\":[]}"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), &clock, unthrottled());
    let failure = client.get_catalog_item("B000TEST01").await.expect_err("missing item");

    assert!(matches!(failure.error, SpApiError::Upstream { status: 404, .. }));
    assert_eq!(failure.attempts, 1);
}

#[tokio::test]
async fn test_requests_carry_token_and_signature() {
    let server = MockServer::start().await;
    let clock = MockClock::new();

    Mock::given(method("GET"))
        .and(path("/products/pricing/v0/items/B000TEST01/offers"))
        .and(query_param("MarketplaceId", "ATVPDKIKX0DER"))
        .and(query_param("ItemCondition", "Used"))
        .and(header("x-amz-access-token", ACCESS_TOKEN))
        .and(header("x-amz-security-token", "integration-session"))
        .and(header_exists("x-amz-date"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"payload": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), &clock, unthrottled());
    client.get_item_offers("B000TEST01", ItemCondition::Used).await.expect("signed request");

    let requests = server.received_requests().await.expect("recording enabled");
    let authorization = requests[0]
        .headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .expect("authorization header");
    assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=ASIAINTEGRATION/"));
    assert!(authorization.contains("/us-east-1/execute-api/aws4_request"));
    assert!(authorization.contains("x-amz-access-token"));
}

#[tokio::test]
async fn test_announced_rate_is_adopted_for_family() {
    let server = MockServer::start().await;
    let clock = MockClock::new();

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-amzn-RateLimit-Limit", "0.5")
                .set_body_json(json!({})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), &clock, unthrottled());
    client.get_catalog_item("B000TEST01").await.expect("success");

    assert_eq!(client.limiter().sustained_rate("catalog"), 0.5);
}

#[tokio::test]
async fn test_limiter_paces_calls_in_one_family() {
    let server = MockServer::start().await;
    let clock = MockClock::new();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(3)
        .mount(&server)
        .await;

    let rate = RateLimitConfig::new(1.0, 1).expect("valid rate");
    let client = client_for(&server.uri(), &clock, rate);
    for _ in 0..3 {
        client.get_catalog_item("B000TEST01").await.expect("success");
    }

    assert!(clock.total_slept() >= Duration::from_millis(1900), "slept {:?}", clock.total_slept());
}

#[tokio::test]
async fn test_competitive_pricing_rejects_oversized_batch() {
    let server = MockServer::start().await;
    let clock = MockClock::new();
    let client = client_for(&server.uri(), &clock, unthrottled());

    let asins: Vec<String> = (0..21).map(|i| format!("B{i:09}")).collect();
    let refs: Vec<&str> = asins.iter().map(String::as_str).collect();
    let failure = client.get_competitive_pricing(&refs).await.expect_err("too many ASINs");

    assert_eq!(failure.attempts, 0);
    assert!(matches!(failure.error, SpApiError::Config(_)));
    assert_eq!(received(&server).await, 0);
}
