#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cost-control layers for metered upstream APIs.
//!
//! [`RateLimiter`] gates outbound calls; [`ResponseCache`] remembers
//! responses for identical normalized queries. Both are pure performance
//! layers: every consumer must behave correctly with [`NoCache`].

pub mod key;
pub mod rate_limiter;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::{Expiry, future::Cache};
use serde::{Serialize, de::DeserializeOwned};

pub use key::{CacheKey, CacheNamespace};
pub use rate_limiter::RateLimiter;

/// Default number of entries kept by [`MemoryCache`].
pub const DEFAULT_CAPACITY: u64 = 10_000;

/// Key/value store with per-entry TTL.
///
/// Values are serialized JSON strings so one cache instance can hold every
/// namespace. Use [`get_json`] / [`set_json`] for typed access.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Returns the cached value, or `None` if absent or expired.
    async fn get(&self, key: &CacheKey) -> Option<String>;

    /// Stores `value` for `ttl`.
    async fn set(&self, key: &CacheKey, value: String, ttl: Duration);
}

/// Reads and deserializes a cached value.
///
/// An entry that no longer deserializes (for example after a schema change)
/// is treated as a miss.
pub async fn get_json<T: DeserializeOwned>(
    cache: &(impl ResponseCache + ?Sized),
    key: &CacheKey,
) -> Option<T> {
    let raw = cache.get(key).await?;
    match serde_json::from_str(&raw) {
        Ok(value) => {
            log::debug!("Cache hit: {key}");
            Some(value)
        }
        Err(e) => {
            log::warn!("Discarding undecodable cache entry {key}: {e}");
            None
        }
    }
}

/// Serializes and stores a value. Serialization failures are logged and
/// the value is simply not cached.
pub async fn set_json<T: Serialize + Sync>(
    cache: &(impl ResponseCache + ?Sized),
    key: &CacheKey,
    value: &T,
    ttl: Duration,
) {
    match serde_json::to_string(value) {
        Ok(raw) => cache.set(key, raw, ttl).await,
        Err(e) => log::warn!("Failed to serialize cache entry {key}: {e}"),
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache backed by `moka`, bounded by entry count.
#[derive(Clone)]
pub struct MemoryCache {
    inner: Cache<String, Entry>,
}

impl MemoryCache {
    /// Creates a cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(capacity)
            .expire_after(EntryExpiry)
            .build();
        Self { inner }
    }

    /// Number of live entries (approximate, as reported by `moka`).
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<String> {
        self.inner.get(key.as_str()).await.map(|entry| entry.value)
    }

    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.inner
            .insert(key.as_str().to_string(), Entry { value, ttl })
            .await;
    }
}

/// A cache that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl ResponseCache for NoCache {
    async fn get(&self, _key: &CacheKey) -> Option<String> {
        None
    }

    async fn set(&self, _key: &CacheKey, _value: String, _ttl: Duration) {}
}
