//! Plumbing shared by every provider adapter
//!
//! A [`ProviderContext`] bundles the adapter's credential, settings, HTTP
//! client, response cache and rate limiter. The cache and limiter are shared
//! process-wide; the credential belongs to the current request.

use super::traits::{check_status, ProviderKind, ProviderRequest, ProviderResponse};
use crate::cache::{cache_key, ResponseCache};
use crate::config::ProviderSettings;
use crate::error::{ProviderError, RateLimitOrigin, SearchError};
use crate::network::HttpClient;
use crate::ratelimit::RateLimiter;
use crate::search::{ProviderResults, SearchRequest};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const FALLBACK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct ProviderContext {
    kind: ProviderKind,
    client: HttpClient,
    settings: ProviderSettings,
    api_key: Option<String>,
    cache: ResponseCache,
    limiter: Arc<RateLimiter>,
}

impl ProviderContext {
    pub fn new(
        kind: ProviderKind,
        client: HttpClient,
        settings: ProviderSettings,
        api_key: Option<String>,
        cache: ResponseCache,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            kind,
            client,
            settings,
            api_key: api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            cache,
            limiter,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Enabled in settings and holding a credential
    pub fn available(&self) -> bool {
        self.settings.enabled && self.api_key.is_some()
    }

    pub fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: self.name().to_string(),
            })
    }

    /// Model from settings, or the adapter's default
    pub fn model<'a>(&'a self, default: &'a str) -> &'a str {
        self.settings.model.as_deref().unwrap_or(default)
    }

    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.settings.timeout)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(FALLBACK_TIMEOUT)
    }

    /// Absolute URL for `path` under the configured base URL.
    ///
    /// A malformed base URL is a configuration error, not a provider outage.
    pub fn endpoint(&self, path: &str) -> Result<String, SearchError> {
        let base = self.settings.parsed_base_url(self.name())?;
        Ok(format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        ))
    }

    /// Take a slot from the rate limiter or fail as locally throttled
    pub fn acquire(&self) -> Result<(), ProviderError> {
        if self.limiter.allow() {
            Ok(())
        } else {
            warn!("{} local rate limit exceeded", self.name());
            Err(ProviderError::RateLimited {
                provider: self.name().to_string(),
                origin: RateLimitOrigin::Local,
            })
        }
    }

    /// Send a request with the provider timeout and classify the status
    pub async fn send(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let response = self
            .client
            .execute_with_timeout(self.name(), request, self.timeout())
            .await?;
        check_status(self.name(), &response)?;
        Ok(response)
    }

    /// Serve `request` from the cache, or throttle, fetch and store.
    ///
    /// Cache hits do not consume a rate-limit slot. Failures are not cached.
    pub async fn cached<F, Fut>(
        &self,
        request: &SearchRequest,
        fetch: F,
    ) -> Result<ProviderResults, SearchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ProviderResults, SearchError>>,
    {
        let key = cache_key(
            self.name(),
            request.query(),
            request.requested_count(),
            request.search_type(),
        );

        if let Some(hit) = self.cache.get(&key).await {
            debug!("{} served '{}' from cache", self.name(), request.query());
            return Ok(hit);
        }

        self.acquire()?;
        let results = fetch().await?;
        self.cache.set(key, results.clone()).await;
        Ok(results)
    }
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("kind", &self.kind)
            .field("available", &self.available())
            .field("base_url", &self.settings.base_url)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Context pointed at a mock server, with its own cache and limiter
#[cfg(test)]
pub(crate) fn test_context(kind: ProviderKind, base_url: &str, api_key: Option<&str>) -> ProviderContext {
    test_context_with(kind, base_url, api_key, ResponseCache::new(60, 100), 60)
}

#[cfg(test)]
pub(crate) fn test_context_with(
    kind: ProviderKind,
    base_url: &str,
    api_key: Option<&str>,
    cache: ResponseCache,
    ceiling: u32,
) -> ProviderContext {
    let settings = ProviderSettings {
        base_url: base_url.to_string(),
        timeout: 5.0,
        ..Default::default()
    };
    ProviderContext::new(
        kind,
        HttpClient::new().unwrap(),
        settings,
        api_key.map(str::to_string),
        cache,
        Arc::new(RateLimiter::new(ceiling)),
    )
}
