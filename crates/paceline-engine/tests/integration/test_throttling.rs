//! Throttle recovery, quota retuning, and ignore policies end to end

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use paceline_core::config::{FetchConfig, IgnorePolicy, RetryConfig};
use paceline_core::domain::errors::ErrorClass;
use paceline_core::domain::newtypes::ApiClass;
use paceline_engine::engine::FetchEngine;

use crate::common::{init_tracing, JsonPageSource};

fn fast_config() -> FetchConfig {
    FetchConfig {
        retry: RetryConfig {
            max_attempts: 2,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            max_quota_waits: 2,
            jitter: 0.0,
        },
        max_concurrent: 2,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_429_then_success_recovers_and_slows_down() {
    init_tracing();
    let server = MockServer::start().await;

    // First request is throttled, afterwards the provider recovers
    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "0")
                .set_body_string("slow down"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [1],
            "next_cursor": null
        })))
        .mount(&server)
        .await;

    let engine = FetchEngine::new();
    let ctx = engine.context("mock-provider", ApiClass::Rest, &fast_config());
    let baseline = ctx.limiter().baseline_rate();

    let source = Arc::new(JsonPageSource::new(server.uri(), "/items"));
    let mut paginator = ctx.paginator("items", source);

    let items = paginator.next_page().await.unwrap().unwrap();
    assert_eq!(items, vec![json!(1)]);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);

    // The observed throttle halved the shared refill rate
    assert!(ctx.limiter().current_rate() < baseline);
}

#[tokio::test]
async fn test_quota_headers_retune_limiter() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ratelimit-remaining", "5")
                .insert_header("ratelimit-limit", "100")
                .insert_header("ratelimit-reset", "60")
                .set_body_json(json!({
                    "items": [1],
                    "next_cursor": null
                })),
        )
        .mount(&server)
        .await;

    let engine = FetchEngine::new();
    let ctx = engine.context("mock-provider", ApiClass::Rest, &fast_config());
    let baseline = ctx.limiter().baseline_rate();

    let source = Arc::new(JsonPageSource::new(server.uri(), "/items"));
    let mut paginator = ctx.paginator("items", source);
    paginator.next_page().await.unwrap().unwrap();

    // Nearly-exhausted quota reported in headers slowed the limiter down
    assert!(ctx.limiter().current_rate() < baseline);

    let budget = ctx.limiter().budget().unwrap();
    assert_eq!(budget.remaining(), 5);
    assert_eq!(budget.limit(), 100);
}

#[tokio::test]
async fn test_ignored_status_yields_empty_sequence() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such resource"))
        .mount(&server)
        .await;

    let engine = FetchEngine::new();
    let config = FetchConfig {
        ignore: IgnorePolicy::of([404]),
        ..fast_config()
    };
    let ctx = engine.context("mock-provider", ApiClass::Rest, &config);

    let source = Arc::new(JsonPageSource::new(server.uri(), "/gone"));
    let mut paginator = ctx.paginator("gone", source);

    // 404 is on the ignore list: an empty sequence, not an error
    assert!(paginator.next_page().await.is_none());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unignored_client_error_surfaces_classification() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/forbidden"))
        .respond_with(ResponseTemplate::new(403).set_body_string("access denied"))
        .mount(&server)
        .await;

    let engine = FetchEngine::new();
    let ctx = engine.context("mock-provider", ApiClass::Rest, &fast_config());

    let source = Arc::new(JsonPageSource::new(server.uri(), "/forbidden"));
    let mut paginator = ctx.paginator("forbidden", source);

    let failure = paginator.next_page().await.unwrap().unwrap_err();
    assert_eq!(failure.class, ErrorClass::Client);
    assert_eq!(failure.attempts, 1);
    // The failure carries enough for a connector to skip this resource
    // and continue its batch
    assert!(failure.to_string().contains("forbidden"));

    // Client errors are not retried
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_server_errors_retry_until_exhausted() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let engine = FetchEngine::new();
    let ctx = engine.context("mock-provider", ApiClass::Rest, &fast_config());

    let source = Arc::new(JsonPageSource::new(server.uri(), "/flaky"));
    let mut paginator = ctx.paginator("flaky", source);

    let failure = paginator.next_page().await.unwrap().unwrap_err();
    assert_eq!(failure.class, ErrorClass::Server);
    assert_eq!(failure.attempts, 2);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}
