//! Provider registry
//!
//! [`ProviderPool`] owns the process-wide pieces (HTTP client, one response
//! cache per provider, the rate-limiter registry) and builds request-scoped
//! [`Provider`] values carrying the caller's credentials.

use super::answer::AnswerProvider;
use super::context::ProviderContext;
use super::credentials::ProviderCredentials;
use super::suggestion::SuggestionProvider;
use super::traits::{ProbeReport, ProviderKind, SearchProvider};
use super::web::WebProvider;
use crate::cache::ResponseCache;
use crate::config::{ProviderSettings, Settings};
use crate::error::SearchError;
use crate::network::HttpClient;
use crate::ratelimit::RateLimiterRegistry;
use crate::search::{ProviderResults, SearchRequest};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// One upstream provider, ready to call
#[derive(Debug, Clone)]
pub enum Provider {
    Suggestion(SuggestionProvider),
    Answer(AnswerProvider),
    Web(WebProvider),
}

impl Provider {
    fn context(&self) -> &ProviderContext {
        match self {
            Self::Suggestion(p) => p.context(),
            Self::Answer(p) => p.context(),
            Self::Web(p) => p.context(),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.context().kind()
    }

    /// Validate the credential with a cheap authenticated call
    pub async fn probe(&self) -> Result<ProbeReport, SearchError> {
        match self {
            Self::Suggestion(p) => p.probe().await,
            Self::Answer(p) => p.probe().await,
            Self::Web(p) => p.probe().await,
        }
    }

    /// Rewrite a query; providers without a language model return `None`
    pub async fn enhance(&self, query: &str) -> Result<Option<String>, SearchError> {
        match self {
            Self::Suggestion(p) => p.enhance(query).await,
            Self::Answer(p) => p.enhance(query).await,
            Self::Web(_) => Ok(None),
        }
    }
}

#[async_trait]
impl SearchProvider for Provider {
    fn name(&self) -> &str {
        self.context().name()
    }

    fn available(&self) -> bool {
        self.context().available()
    }

    async fn search(&self, request: &SearchRequest) -> Result<ProviderResults, SearchError> {
        match self {
            Self::Suggestion(p) => p.search(request).await,
            Self::Answer(p) => p.search(request).await,
            Self::Web(p) => p.search(request).await,
        }
    }
}

/// Public description of a provider, without secrets
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: &'static str,
    pub role: ProviderKind,
    pub enabled: bool,
    pub configured: bool,
    pub base_url: String,
    pub rate_limit_per_minute: u32,
    pub cache_ttl_seconds: u64,
}

/// Shared state for building providers
pub struct ProviderPool {
    client: HttpClient,
    settings: HashMap<ProviderKind, ProviderSettings>,
    caches: HashMap<ProviderKind, ResponseCache>,
    limiters: Arc<RateLimiterRegistry>,
}

impl ProviderPool {
    pub fn new(settings: &Settings, client: HttpClient, limiters: Arc<RateLimiterRegistry>) -> Self {
        let mut provider_settings = HashMap::new();
        let mut caches = HashMap::new();

        for kind in ProviderKind::ALL {
            let section = Self::section(settings, kind).clone();
            let cache = if settings.cache.enabled {
                ResponseCache::new(settings.cache_ttl(&section), settings.cache.max_capacity)
            } else {
                ResponseCache::disabled()
            };
            caches.insert(kind, cache);
            provider_settings.insert(kind, section);
        }

        Self {
            client,
            settings: provider_settings,
            caches,
            limiters,
        }
    }

    fn section(settings: &Settings, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::Suggestion => &settings.providers.suggestion,
            ProviderKind::Answer => &settings.providers.answer,
            ProviderKind::Web => &settings.providers.web,
        }
    }

    fn settings_for(&self, kind: ProviderKind) -> ProviderSettings {
        self.settings.get(&kind).cloned().unwrap_or_default()
    }

    /// Build one provider with the given credential
    pub fn provider(&self, kind: ProviderKind, api_key: Option<&str>) -> Provider {
        let settings = self.settings_for(kind);
        let limiter = self
            .limiters
            .get_or_create(kind.name(), settings.rate_limit_per_minute);
        let cache = self
            .caches
            .get(&kind)
            .cloned()
            .unwrap_or_else(ResponseCache::disabled);

        let ctx = ProviderContext::new(
            kind,
            self.client.clone(),
            settings,
            api_key.map(str::to_string),
            cache,
            limiter,
        );

        match kind {
            ProviderKind::Suggestion => Provider::Suggestion(SuggestionProvider::new(ctx)),
            ProviderKind::Answer => Provider::Answer(AnswerProvider::new(ctx)),
            ProviderKind::Web => Provider::Web(WebProvider::new(ctx)),
        }
    }

    /// All providers in cascade order
    pub fn build(&self, credentials: &ProviderCredentials) -> Vec<Provider> {
        ProviderKind::ALL
            .into_iter()
            .map(|kind| self.provider(kind, credentials.get(kind)))
            .collect()
    }

    pub fn describe(&self, credentials: &ProviderCredentials) -> Vec<ProviderStatus> {
        ProviderKind::ALL
            .into_iter()
            .map(|kind| {
                let settings = self.settings_for(kind);
                let cache_ttl_seconds = self
                    .caches
                    .get(&kind)
                    .map(|c| c.ttl().as_secs())
                    .unwrap_or_default();
                ProviderStatus {
                    name: kind.name(),
                    role: kind,
                    enabled: settings.enabled,
                    configured: credentials.get(kind).is_some(),
                    base_url: settings.base_url,
                    rate_limit_per_minute: settings.rate_limit_per_minute,
                    cache_ttl_seconds,
                }
            })
            .collect()
    }

    /// Cached entries across all providers
    pub fn cached_entries(&self) -> u64 {
        self.caches.values().map(ResponseCache::size).sum()
    }
}
