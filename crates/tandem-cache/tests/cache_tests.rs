//! `CachedTransport` over a scripted transport, alone and inside a handler run.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tandem_cache::{CacheConfig, CacheStatus, CachedTransport, RequestCache};
use tandem_core::{request_operation, HttpRequest, Method, RequestsHandler, Transport};
use tandem_testing::{MockTransport, Reply};

fn cached(mock: &MockTransport, config: CacheConfig) -> CachedTransport<MockTransport> {
    let cache = Arc::new(RequestCache::new(config));
    CachedTransport::new(Arc::new(mock.clone()), cache)
}

#[tokio::test(start_paused = true)]
async fn concurrent_identical_requests_share_one_call() {
    let mock = MockTransport::new();
    mock.script_delayed(
        Method::Get,
        "/todos",
        Duration::from_millis(100),
        vec![Reply::Ok(json!([{"id": 1}]))],
    );
    let transport = cached(&mock, CacheConfig::default());

    let (first, second, third) = tokio::join!(
        transport.send(HttpRequest::get("/todos")),
        transport.send(HttpRequest::get("/todos")),
        transport.send(HttpRequest::get("/todos")),
    );

    assert_eq!(first.unwrap(), json!([{"id": 1}]));
    assert_eq!(second.unwrap(), json!([{"id": 1}]));
    assert_eq!(third.unwrap(), json!([{"id": 1}]));
    assert_eq!(mock.call_count(Method::Get, "/todos"), 1);

    let entry = transport
        .cache()
        .get_cached_response(&HttpRequest::get("/todos"))
        .unwrap();
    assert_eq!(entry.status, CacheStatus::Resolved);
}

#[tokio::test(start_paused = true)]
async fn sub_second_ttl_still_dedupes() {
    let mock = MockTransport::new();
    mock.script_delayed(
        Method::Get,
        "/todos",
        Duration::from_millis(100),
        vec![Reply::Ok(json!(["t"]))],
    );
    let transport = cached(&mock, CacheConfig::default().with_ttl(Duration::from_millis(500)));

    let (first, second) = tokio::join!(
        transport.send(HttpRequest::get("/todos")),
        transport.send(HttpRequest::get("/todos")),
    );
    assert_eq!(first.unwrap(), json!(["t"]));
    assert_eq!(second.unwrap(), json!(["t"]));

    assert_eq!(transport.send(HttpRequest::get("/todos")).await.unwrap(), json!(["t"]));
    assert_eq!(mock.call_count(Method::Get, "/todos"), 1);
}

#[tokio::test]
async fn failed_call_is_evicted_and_retried() {
    let mock = MockTransport::new();
    mock.script(
        Method::Get,
        "/users/1",
        vec![Reply::Fail("upstream 503".into()), Reply::Ok(json!({"id": 1}))],
    );
    let transport = cached(&mock, CacheConfig::default());

    let error = transport.send(HttpRequest::get("/users/1")).await.unwrap_err();
    assert!(error.to_string().contains("upstream 503"));
    assert!(transport.cache().is_empty());

    let value = transport.send(HttpRequest::get("/users/1")).await.unwrap();
    assert_eq!(value, json!({"id": 1}));
    assert_eq!(mock.call_count(Method::Get, "/users/1"), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_waiters_all_see_the_failure() {
    let mock = MockTransport::new();
    mock.script_delayed(
        Method::Get,
        "/flaky",
        Duration::from_millis(20),
        vec![Reply::Fail("boom".into())],
    );
    let transport = cached(&mock, CacheConfig::default());

    let (first, second) = tokio::join!(
        transport.send(HttpRequest::get("/flaky")),
        transport.send(HttpRequest::get("/flaky")),
    );

    assert!(first.is_err());
    assert!(second.is_err());
    assert_eq!(mock.call_count(Method::Get, "/flaky"), 1);
    assert!(transport.cache().is_empty());
}

#[tokio::test]
async fn query_key_order_does_not_split_the_cache() {
    let mock = MockTransport::new();
    mock.respond(Method::Get, "/todos", json!(["t"]));
    let transport = cached(&mock, CacheConfig::default());

    transport
        .send(HttpRequest::get("/todos").with_query(json!({"page": 1, "limit": 10})))
        .await
        .unwrap();
    transport
        .send(HttpRequest::get("/todos").with_query(json!({"limit": 10, "page": 1})))
        .await
        .unwrap();

    assert_eq!(mock.call_count(Method::Get, "/todos"), 1);
    assert_eq!(transport.cache().len(), 1);
}

#[tokio::test]
async fn mutations_bypass_the_cache_by_default() {
    let mock = MockTransport::new();
    mock.respond(Method::Post, "/todos", json!({"created": true}));
    let transport = cached(&mock, CacheConfig::default());

    let request = HttpRequest::post("/todos", json!({"title": "write docs"}));
    transport.send(request.clone()).await.unwrap();
    transport.send(request).await.unwrap();

    assert_eq!(mock.call_count(Method::Post, "/todos"), 2);
    assert!(transport.cache().is_empty());
}

#[tokio::test]
async fn mutations_can_opt_into_the_cache() {
    let mock = MockTransport::new();
    mock.respond(Method::Post, "/search", json!({"hits": 0}));
    let transport = cached(&mock, CacheConfig::default().with_cache_mutations(true));

    let request = HttpRequest::post("/search", json!({"q": "rust"}));
    transport.send(request.clone()).await.unwrap();
    transport.send(request).await.unwrap();

    assert_eq!(mock.call_count(Method::Post, "/search"), 1);
}

#[tokio::test(start_paused = true)]
async fn resolved_value_expires_after_ttl() {
    let mock = MockTransport::new();
    mock.script(
        Method::Get,
        "/config",
        vec![Reply::Ok(json!("v1")), Reply::Ok(json!("v2"))],
    );
    let transport = cached(&mock, CacheConfig::default()).with_ttl(Duration::from_secs(60));

    assert_eq!(transport.send(HttpRequest::get("/config")).await.unwrap(), json!("v1"));
    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(transport.send(HttpRequest::get("/config")).await.unwrap(), json!("v1"));

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(transport.send(HttpRequest::get("/config")).await.unwrap(), json!("v2"));
    assert_eq!(mock.call_count(Method::Get, "/config"), 2);
}

#[tokio::test(start_paused = true)]
async fn handler_batches_dedupe_through_the_cache() {
    let mock = MockTransport::new();
    mock.script_delayed(
        Method::Get,
        "/users/1",
        Duration::from_millis(10),
        vec![Reply::Ok(json!({"id": 1, "name": "Leanne"}))],
    );
    let transport = Arc::new(cached(&mock, CacheConfig::default()));

    let handler = RequestsHandler::new();
    handler
        .parallel(vec![
            request_operation(transport.clone(), HttpRequest::get("/users/1")),
            request_operation(transport.clone(), HttpRequest::get("/users/1")),
        ])
        .unwrap()
        .parallel(vec![request_operation(
            transport.clone(),
            HttpRequest::get("/users/1"),
        )])
        .unwrap();

    let results = handler.wait().await.unwrap();
    let user = json!({"id": 1, "name": "Leanne"});
    assert_eq!(results.to_json(), json!([[user.clone(), user.clone()], user]));
    assert_eq!(mock.call_count(Method::Get, "/users/1"), 1);
}
