//! De-duplicating TTL cache for tandem transports.
//!
//! A [`RequestCache`] maps a canonical request key to an entry that is either
//! pending (one shared in-flight call) or resolved (a value kept until it
//! expires). Failed calls are evicted so the next identical request tries
//! again.
//!
//! ```text
//! send(GET /todos?page=1) ──► RequestKey GET_"/todos"?{"page":1}__
//!                                 │
//!            ┌────────────────────┼─────────────────────┐
//!            ▼                    ▼                     ▼
//!        resolved             pending                 miss
//!     return value      await shared call    start call, register
//!                                              ok  ─► resolve, TTL restarts
//!                                              err ─► evict
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tandem_cache::{CacheConfig, CachedTransport, RequestCache};
//!
//! let cache = Arc::new(RequestCache::new(CacheConfig::default()));
//! let transport = CachedTransport::new(Arc::new(http), cache.clone());
//! ```

mod cache;
mod key;
mod transport;

pub use cache::{
    CacheConfig, CacheEntry, CacheStatus, InFlight, RequestCache, DEFAULT_CACHE_EXPIRATION_SECS,
};
pub use key::{canonical_json, normalize_path, RequestKey};
pub use transport::CachedTransport;
