//! # Todo Dashboard Demo
//!
//! Loads a user, their todos and posts from JSONPlaceholder with a
//! `RequestsHandler`. Requests go through a `CachedTransport`, so the
//! duplicate user lookups below hit the network once.
//!
//! Run with `RUST_LOG=debug` to see cache hits and batch progress.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tandem_cache::{CacheConfig, CachedTransport, RequestCache};
use tandem_core::{
    request_operation, HttpRequest, Operation, Requests, RequestsHandler, Response, Transport,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const BASE_URL: &str = "https://jsonplaceholder.typicode.com";

// ============================================================================
// Transport (uses reqwest directly)
// ============================================================================

struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<Value> {
        let url = format!("{}{}", self.base_url, request.path);
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())?;

        let mut builder = self.client.request(method, &url);
        if let Some(query) = &request.query {
            builder = builder.query(query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            bail!("{} {} returned HTTP {}", request.method, url, status.as_u16());
        }
        Ok(response.json().await?)
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cache = Arc::new(RequestCache::new(
        CacheConfig::default().with_ttl(Duration::from_secs(300)),
    ));
    let http = Arc::new(ReqwestTransport::new(BASE_URL)?);
    let api = Arc::new(CachedTransport::new(http, cache.clone()));

    let get = |path: &str| request_operation(api.clone(), HttpRequest::get(path));

    let handler = RequestsHandler::new();
    handler
        // The user is required; the album lookup is nice to have.
        .parallel(Requests::grouped(
            vec![get("/users/1"), get("/users/1")],
            vec![get("/albums/999999")],
        ))?
        // Later requests build on the user loaded above.
        .series(vec![
            Operation::factory({
                let api = api.clone();
                move |prior: Option<Response>| async move {
                    let user_id = prior
                        .as_ref()
                        .and_then(|batch| batch.get(0))
                        .and_then(Response::as_value)
                        .and_then(|user| user["id"].as_u64())
                        .unwrap_or(1);
                    let request =
                        HttpRequest::get("/todos").with_query(json!({ "userId": user_id }));
                    api.send(request).await
                }
            }),
            get("/posts/1"),
        ])?
        .then(|results| {
            info!(results = %summarize(&results), "dashboard loaded");
        })
        .catch(|error| {
            if error.is_warning() {
                let partial = error.partial_results().map(|r| summarize(&r));
                info!(%error, partial = ?partial, "dashboard loaded with gaps");
            } else {
                tracing::error!(%error, "dashboard failed");
            }
        });

    let outcome = handler.wait().await;
    info!(
        run_id = %handler.id(),
        ok = outcome.is_ok(),
        cached_entries = cache.len(),
        "run settled"
    );

    Ok(())
}

/// Short description of a run's results for logging.
fn summarize(results: &Response) -> String {
    match results {
        Response::Value(Value::Array(items)) => format!("{} items", items.len()),
        Response::Value(_) => "1 value".to_string(),
        Response::Error(error) => format!("error: {error}"),
        Response::List(batches) => batches
            .iter()
            .map(summarize)
            .collect::<Vec<_>>()
            .join(", "),
    }
}
