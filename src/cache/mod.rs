//! Response caching for provider calls
//!
//! Each provider owns a [`ResponseCache`] with its own TTL. Keys come from
//! [`cache_key`], a pure function of the provider name and the request
//! parameters, so adapters never build keys ad hoc.

use crate::search::{ProviderResults, SearchType};
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

/// Default time-to-live for cached provider responses
pub const DEFAULT_TTL_SECONDS: u64 = 900;

/// Default number of entries kept per provider
pub const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// TTL store for provider payloads; may be disabled
#[derive(Clone)]
pub struct ResponseCache {
    inner: Option<Cache<String, ProviderResults>>,
    ttl: Duration,
}

impl ResponseCache {
    /// Create a cache whose entries expire `ttl_seconds` after insertion
    pub fn new(ttl_seconds: u64, max_capacity: u64) -> Self {
        let ttl = Duration::from_secs(ttl_seconds);
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(max_capacity)
            .build();

        Self {
            inner: Some(cache),
            ttl,
        }
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self {
            inner: None,
            ttl: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a cached payload; expired entries are absent
    pub async fn get(&self, key: &str) -> Option<ProviderResults> {
        let cache = self.inner.as_ref()?;
        let hit = cache.get(key).await;
        if hit.is_some() {
            debug!("Response cache hit for {}", key);
        }
        hit
    }

    /// Store a payload
    pub async fn set(&self, key: String, value: ProviderResults) {
        if let Some(cache) = &self.inner {
            cache.insert(key, value).await;
        }
    }

    /// Approximate number of live entries
    pub fn size(&self) -> u64 {
        self.inner.as_ref().map(|c| c.entry_count()).unwrap_or(0)
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECONDS, DEFAULT_MAX_CAPACITY)
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("enabled", &self.is_enabled())
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Lowercase and collapse whitespace so trivially different queries share a key
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derive the cache key for a provider call
pub fn cache_key(
    provider: &str,
    query: &str,
    requested_count: u32,
    search_type: SearchType,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider.as_bytes());
    hasher.update([0u8]);
    hasher.update(normalize_query(query).as_bytes());
    hasher.update([0u8]);
    hasher.update(requested_count.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(search_type.as_str().as_bytes());

    format!("{}:{:x}", provider, hasher.finalize())
}
