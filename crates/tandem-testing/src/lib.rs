//! Testing utilities for tandem.
//!
//! - [`MockTransport`] answers requests from a script and records every call
//! - [`ok_after`] / [`fail_after`] build operations with artificial latency

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tandem_core::{HttpRequest, Method, Operation, Transport};

/// Scripted reply for one `(method, path)` pair.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(Value),
    Fail(String),
}

#[derive(Debug, Clone)]
struct Script {
    replies: Vec<Reply>,
    delay: Duration,
}

/// In-memory [`Transport`] for tests.
///
/// Replies are consumed in order; the last reply repeats once the script runs
/// out. Unscripted requests fail.
#[derive(Clone, Default)]
pub struct MockTransport {
    scripts: Arc<Mutex<HashMap<(Method, String), Script>>>,
    calls: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a sequence of replies for `method path`.
    pub fn script(&self, method: Method, path: &str, replies: Vec<Reply>) -> &Self {
        self.script_delayed(method, path, Duration::ZERO, replies)
    }

    /// Same as [`script`](Self::script) but every reply waits `delay` first.
    pub fn script_delayed(
        &self,
        method: Method,
        path: &str,
        delay: Duration,
        replies: Vec<Reply>,
    ) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .insert((method, path.to_string()), Script { replies, delay });
        self
    }

    pub fn respond(&self, method: Method, path: &str, value: Value) -> &Self {
        self.script(method, path, vec![Reply::Ok(value)])
    }

    pub fn fail(&self, method: Method, path: &str, message: &str) -> &Self {
        self.script(method, path, vec![Reply::Fail(message.to_string())])
    }

    /// Every request received so far.
    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of requests received for `method path`.
    pub fn call_count(&self, method: Method, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .count()
    }

    fn next_reply(&self, request: &HttpRequest) -> Option<(Reply, Duration)> {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.get_mut(&(request.method, request.path.clone()))?;
        let reply = if script.replies.len() > 1 {
            script.replies.remove(0)
        } else {
            script.replies.first()?.clone()
        };
        Some((reply, script.delay))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<Value> {
        self.calls.lock().unwrap().push(request.clone());

        let Some((reply, delay)) = self.next_reply(&request) else {
            return Err(anyhow!("no reply scripted for {} {}", request.method, request.path));
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Reply::Ok(value) => Ok(value),
            Reply::Fail(message) => Err(anyhow!(message)),
        }
    }
}

/// Operation that resolves to `value` after `millis` milliseconds.
pub fn ok_after(millis: u64, value: Value) -> Operation {
    Operation::ready(async move {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(value)
    })
}

/// Operation that fails with `message` after `millis` milliseconds.
pub fn fail_after(millis: u64, message: &'static str) -> Operation {
    Operation::ready(async move {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Err(anyhow!(message))
    })
}
