//! End-to-end pagination against a mock provider

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use paceline_core::config::{FetchConfig, RetryConfig};
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
async fn test_paginates_through_all_pages() {
    init_tracing();
    let server = MockServer::start().await;

    // Cursor-specific pages first, catch-all first page last
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("cursor", "c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [3, 4],
            "next_cursor": "c2"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("cursor", "c2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [5],
            "next_cursor": null
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [1, 2],
            "next_cursor": "c1"
        })))
        .mount(&server)
        .await;

    let engine = FetchEngine::new();
    let ctx = engine.context("mock-provider", ApiClass::Rest, &fast_config());
    let source = Arc::new(JsonPageSource::new(server.uri(), "/items"));
    let mut paginator = ctx.paginator("items", source);

    let mut all_items = Vec::new();
    while let Some(page) = paginator.next_page().await {
        all_items.extend(page.unwrap());
    }

    assert_eq!(all_items, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
    assert_eq!(paginator.pages_yielded(), 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_empty_page_with_cursor_stops() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("cursor", "stale"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [],
            "next_cursor": "stale"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": ["only"],
            "next_cursor": "stale"
        })))
        .mount(&server)
        .await;

    let engine = FetchEngine::new();
    let ctx = engine.context("mock-provider", ApiClass::Rest, &fast_config());
    let source = Arc::new(JsonPageSource::new(server.uri(), "/items"));
    let mut paginator = ctx.paginator("items", source);

    assert_eq!(
        paginator.next_page().await.unwrap().unwrap(),
        vec![json!("only")]
    );
    // The empty page ends the sequence; its stale cursor is never followed
    assert!(paginator.next_page().await.is_none());
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_contexts_share_one_limiter_per_host() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [1],
            "next_cursor": null
        })))
        .mount(&server)
        .await;

    let engine = FetchEngine::new();
    let ctx_a = engine.context("mock-provider", ApiClass::Rest, &fast_config());
    let ctx_b = engine.context("mock-provider", ApiClass::Rest, &fast_config());

    let source = Arc::new(JsonPageSource::new(server.uri(), "/items"));
    let mut paginator = ctx_a.paginator("items", Arc::clone(&source));
    paginator.next_page().await.unwrap().unwrap();

    // Both contexts drained tokens from the same bucket
    assert!(Arc::ptr_eq(ctx_a.limiter(), ctx_b.limiter()));
    assert!(ctx_b.limiter().available_tokens() < fast_config().limiter.capacity);
    assert_eq!(engine.registry().len(), 1);
}
