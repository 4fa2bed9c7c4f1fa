//! A [`Transport`] that routes requests through a [`RequestCache`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tandem_core::{HttpRequest, Transport};

use crate::cache::RequestCache;

/// Wraps a transport so identical requests share one call and reuse
/// resolved values until they expire.
///
/// Only GET requests go through the cache unless
/// [`CacheConfig::cache_mutations`](crate::CacheConfig::cache_mutations) is set.
pub struct CachedTransport<T: ?Sized> {
    cache: Arc<RequestCache>,
    ttl: Option<Duration>,
    inner: Arc<T>,
}

impl<T: ?Sized> Clone for CachedTransport<T> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            ttl: self.ttl,
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport + ?Sized> CachedTransport<T> {
    pub fn new(inner: Arc<T>, cache: Arc<RequestCache>) -> Self {
        Self {
            cache,
            ttl: None,
            inner,
        }
    }

    /// Lifetime for entries created by this transport.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn cache(&self) -> &Arc<RequestCache> {
        &self.cache
    }

    pub fn inner(&self) -> &Arc<T> {
        &self.inner
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for CachedTransport<T> {
    async fn send(&self, request: HttpRequest) -> anyhow::Result<Value> {
        if !request.method.is_safe() && !self.cache.config().cache_mutations {
            return self.inner.send(request).await;
        }

        let inner = self.inner.clone();
        let call_request = request.clone();
        let value = self
            .cache
            .fetch(&request, self.ttl, move || async move {
                inner.send(call_request).await
            })
            .await?;
        Ok(value)
    }
}
