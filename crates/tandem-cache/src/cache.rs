//! Request cache with in-flight de-duplication and TTL expiry.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tandem_core::{HttpRequest, OperationError};
use tokio::time::Instant;
use tracing::debug;

use crate::key::RequestKey;

/// Default lifetime of a cache entry, in seconds.
pub const DEFAULT_CACHE_EXPIRATION_SECS: u64 = 3600;

/// In-flight request shared by every caller asking for the same key.
pub type InFlight = Shared<BoxFuture<'static, Result<Value, OperationError>>>;

/// Configuration for [`RequestCache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When disabled, [`RequestCache::fetch`] always calls through.
    pub enabled: bool,
    /// Lifetime of an entry when the caller gives none, in milliseconds.
    pub default_ttl_ms: u64,
    /// Also cache non-GET requests in [`CachedTransport`](crate::CachedTransport).
    pub cache_mutations: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_ms: DEFAULT_CACHE_EXPIRATION_SECS * 1000,
            cache_mutations: false,
        }
    }
}

impl CacheConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the default lifetime. Non-zero values below a millisecond round
    /// up to one so entries are not born expired.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self.default_ttl_ms = if millis == 0 && !ttl.is_zero() { 1 } else { millis };
        self
    }

    pub fn with_cache_mutations(mut self, cache_mutations: bool) -> Self {
        self.cache_mutations = cache_mutations;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

/// Lifecycle state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Pending,
    Resolved,
    /// The call failed; such entries are evicted rather than kept.
    Failed,
    Expired,
}

/// A cached request.
#[derive(Clone)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub status: CacheStatus,
    pub expires_at: Instant,
    pub ttl: Duration,
    /// Set once the entry is resolved.
    pub value: Option<Value>,
    /// Set while the entry is pending.
    pub in_flight: Option<InFlight>,
}

impl CacheEntry {
    fn pending(key: RequestKey, ttl: Duration, in_flight: Option<InFlight>, now: Instant) -> Self {
        Self {
            key,
            status: CacheStatus::Pending,
            expires_at: now + ttl,
            ttl,
            value: None,
            in_flight,
        }
    }

    /// An entry with a call still in flight never expires; its lifetime
    /// starts when the call resolves.
    pub fn is_live(&self, now: Instant) -> bool {
        self.is_in_flight() || self.expires_at > now
    }

    pub fn is_in_flight(&self) -> bool {
        self.status == CacheStatus::Pending && self.in_flight.is_some()
    }

    /// Status as seen at `now`, reporting expiry even before eviction.
    pub fn status_at(&self, now: Instant) -> CacheStatus {
        if self.is_live(now) {
            self.status
        } else {
            CacheStatus::Expired
        }
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("status", &self.status)
            .field("expires_at", &self.expires_at)
            .field("value", &self.value)
            .field("in_flight", &self.in_flight.is_some())
            .finish()
    }
}

/// Keyed store of pending and resolved requests.
///
/// At most one call per key is in flight; concurrent callers share it.
/// Expired entries are evicted lazily on read. Failed calls are never kept.
///
/// Construct one per client and hand it around as `Arc<RequestCache>`.
pub struct RequestCache {
    entries: DashMap<RequestKey, CacheEntry>,
    config: CacheConfig,
}

impl fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCache")
            .field("config", &self.config)
            .field("entry_count", &self.entries.len())
            .finish()
    }
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl RequestCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the live entry for `request`, evicting it if expired.
    pub fn get_cached_response(&self, request: &HttpRequest) -> Option<CacheEntry> {
        let key = RequestKey::from_request(request);
        let now = Instant::now();

        let live = match self.entries.get(&key) {
            Some(entry) if entry.is_live(now) => Some(entry.value().clone()),
            Some(_) => None,
            None => return None,
        };

        if live.is_none() && self.entries.remove_if(&key, |_, entry| !entry.is_live(now)).is_some() {
            debug!(key = %key, "evicted expired entry");
        }
        live
    }

    /// Registers a pending entry unless a live one exists. Returns whether
    /// an entry was registered.
    pub fn add_http_request(
        &self,
        request: &HttpRequest,
        ttl: Option<Duration>,
        in_flight: Option<InFlight>,
    ) -> bool {
        let key = RequestKey::from_request(request);
        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());
        let now = Instant::now();

        match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) if entry.get().is_live(now) => false,
            Entry::Occupied(mut entry) => {
                entry.insert(CacheEntry::pending(key, ttl, in_flight, now));
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(CacheEntry::pending(key, ttl, in_flight, now));
                true
            }
        }
    }

    /// Marks the live entry for `request` resolved with `value`.
    ///
    /// The entry's lifetime restarts from now. Returns `false` if there is no
    /// live entry.
    pub fn set_cached_response(&self, request: &HttpRequest, value: Value) -> bool {
        let key = RequestKey::from_request(request);
        let now = Instant::now();

        match self.entries.get_mut(&key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.status = CacheStatus::Resolved;
                entry.value = Some(value);
                entry.in_flight = None;
                entry.expires_at = now + entry.ttl;
                true
            }
            _ => false,
        }
    }

    /// Removes the entry for `request`. Returns whether one existed.
    pub fn clear_cached_http_request(&self, request: &HttpRequest) -> bool {
        self.entries
            .remove(&RequestKey::from_request(request))
            .is_some()
    }

    pub fn clear_all(&self) {
        self.entries.clear();
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves `request` through the cache.
    ///
    /// Returns a resolved value if one is live, joins the pending call if
    /// one is in flight, and otherwise starts `call`, registers it, and
    /// stores its value. A failed call removes the entry so the next request
    /// tries again.
    pub async fn fetch<F, Fut>(
        &self,
        request: &HttpRequest,
        ttl: Option<Duration>,
        call: F,
    ) -> Result<Value, OperationError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        if !self.config.enabled {
            return call().await.map_err(OperationError::from);
        }

        let key = RequestKey::from_request(request);
        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());
        let now = Instant::now();

        // Built lazily so `call` runs after the map lock is released.
        let fresh: InFlight = async move { call().await.map_err(OperationError::from) }
            .boxed()
            .shared();

        let in_flight = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut entry) if entry.get().is_live(now) => {
                let resolved = match entry.get().status {
                    CacheStatus::Resolved => entry.get().value.clone(),
                    _ => None,
                };
                let pending = entry.get().in_flight.clone();
                match (resolved, pending) {
                    (Some(value), _) => {
                        debug!(key = %key, "cache hit");
                        return Ok(value);
                    }
                    (None, Some(pending)) => {
                        debug!(key = %key, "joining in-flight request");
                        pending
                    }
                    (None, None) => {
                        entry.insert(CacheEntry::pending(key.clone(), ttl, Some(fresh.clone()), now));
                        fresh
                    }
                }
            }
            Entry::Occupied(mut entry) => {
                debug!(key = %key, "replacing expired entry");
                entry.insert(CacheEntry::pending(key.clone(), ttl, Some(fresh.clone()), now));
                fresh
            }
            Entry::Vacant(entry) => {
                debug!(key = %key, "cache miss");
                entry.insert(CacheEntry::pending(key.clone(), ttl, Some(fresh.clone()), now));
                fresh
            }
        };

        let outcome = in_flight.clone().await;
        self.finish(&key, &in_flight, &outcome);
        outcome
    }

    /// Moves the entry owned by `in_flight` out of pending. Every waiter
    /// calls this; only the first one still finds the entry pending.
    fn finish(&self, key: &RequestKey, in_flight: &InFlight, outcome: &Result<Value, OperationError>) {
        let owned = |entry: &CacheEntry| {
            entry.status == CacheStatus::Pending
                && entry
                    .in_flight
                    .as_ref()
                    .is_some_and(|pending| pending.ptr_eq(in_flight))
        };

        match outcome {
            Ok(value) => {
                if let Some(mut entry) = self.entries.get_mut(key) {
                    if owned(entry.value()) {
                        let now = Instant::now();
                        entry.status = CacheStatus::Resolved;
                        entry.value = Some(value.clone());
                        entry.in_flight = None;
                        entry.expires_at = now + entry.ttl;
                        debug!(key = %key, "request resolved and cached");
                    }
                }
            }
            Err(error) => {
                if self.entries.remove_if(key, |_, entry| owned(entry)).is_some() {
                    debug!(key = %key, status = ?CacheStatus::Failed, %error, "evicted failed request");
                }
            }
        }
    }
}
