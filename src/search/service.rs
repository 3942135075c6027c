//! Search service entry point
//!
//! Wires settings, providers, the orchestrator and quotas together. The web
//! layer and any embedding application call [`SearchService::perform_search`].

use super::models::{SearchOutcome, SearchRequest, SearchType};
use super::orchestrator::SearchOrchestrator;
use crate::clock::{self, Clock};
use crate::config::Settings;
use crate::error::SearchError;
use crate::metrics::Metrics;
use crate::network::HttpClient;
use crate::providers::{
    ProbeReport, Provider, ProviderCredentials, ProviderKind, ProviderPool, SearchProvider,
};
use crate::quota::{QuotaGuard, Tier};
use crate::ratelimit::RateLimiterRegistry;
use crate::users::UserDirectory;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Raw search parameters as a caller supplies them
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub query: String,
    /// Falls back to the configured default when absent
    #[serde(default)]
    pub num_results: Option<u32>,
    /// `auto`, `keyword` or `neural`; anything else means `auto`
    #[serde(default)]
    pub search_type: Option<String>,
    #[serde(default)]
    pub enhance_query: bool,
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

pub struct SearchService {
    settings: Arc<Settings>,
    pool: ProviderPool,
    orchestrator: SearchOrchestrator,
    quota: QuotaGuard,
    metrics: Arc<Metrics>,
}

impl SearchService {
    /// Build a service with the system clock and an HTTP client from settings
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let client = HttpClient::with_settings(&settings.outgoing)?;
        Ok(Self::with_parts(settings, client, clock::system()))
    }

    pub fn with_parts(settings: Settings, client: HttpClient, clock: Arc<dyn Clock>) -> Self {
        let metrics = Arc::new(Metrics::new());
        let limiters = Arc::new(RateLimiterRegistry::with_clock(clock.clone()));
        let pool = ProviderPool::new(&settings, client, limiters);
        let orchestrator =
            SearchOrchestrator::with_clock(settings.search.fallback_enabled, clock.clone())
                .with_metrics(metrics.clone());

        Self {
            settings: Arc::new(settings),
            pool,
            orchestrator,
            quota: QuotaGuard::with_clock(clock),
            metrics,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pool(&self) -> &ProviderPool {
        &self.pool
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn quota_guard(&self) -> &QuotaGuard {
        &self.quota
    }

    /// Validate raw parameters into a request
    pub fn build_request(&self, params: &SearchParams) -> Result<SearchRequest, SearchError> {
        let search = &self.settings.search;
        SearchRequest::new(
            &params.query,
            params.num_results.unwrap_or(search.default_results),
            params
                .search_type
                .as_deref()
                .map(SearchType::parse_lenient)
                .unwrap_or_default(),
            params.enhance_query,
            search.max_results,
        )
    }

    /// User keys, then configured defaults, then shared keys
    pub fn resolve_credentials(&self, user: &ProviderCredentials) -> ProviderCredentials {
        ProviderCredentials::resolve(user, &self.settings.providers)
    }

    /// Run one search with already-resolved credentials, without quota handling
    pub async fn search(
        &self,
        credentials: &ProviderCredentials,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, SearchError> {
        let providers = self.pool.build(credentials);

        let executed = if request.enhance() && self.settings.search.enable_query_enhancement {
            self.enhance(&providers, request.query(), cancel).await?
        } else {
            None
        };

        let Some(executed_query) = executed else {
            return self.orchestrator.search(request, &providers, cancel).await;
        };

        info!("Query enhanced: '{}' -> '{}'", request.query(), executed_query);
        let enhanced = request.with_query(executed_query.clone());
        let mut outcome = self
            .orchestrator
            .search_rewritten(&enhanced, request.query(), &providers, cancel)
            .await?;
        outcome.query = request.query().to_string();
        outcome.executed_query = Some(executed_query);
        Ok(outcome)
    }

    /// Ask the language-model providers to rewrite the query, answer first.
    ///
    /// The first rewrite wins. Failures are logged and skipped; `None` keeps
    /// the original query.
    async fn enhance(
        &self,
        providers: &[Provider],
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, SearchError> {
        for kind in [ProviderKind::Answer, ProviderKind::Suggestion] {
            let Some(provider) = providers
                .iter()
                .find(|p| p.kind() == kind && p.available())
            else {
                continue;
            };

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(SearchError::Cancelled),
                result = provider.enhance(query) => result,
            };

            match result {
                Ok(Some(rewritten)) => return Ok((rewritten != query).then_some(rewritten)),
                Ok(None) => debug!("{} returned no rewrite", provider.name()),
                Err(SearchError::Provider(err)) => {
                    warn!("Query enhancement via {} failed: {}", provider.name(), err)
                }
                Err(fatal) => return Err(fatal),
            }
        }
        Ok(None)
    }

    /// Full search for a user: quota, credentials, cascade, then accounting.
    ///
    /// The limit is checked up front and again when the search is recorded,
    /// so concurrent searches cannot push the counter past the tier limit.
    pub async fn perform_search(
        &self,
        directory: &dyn UserDirectory,
        user_id: &str,
        params: SearchParams,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, SearchError> {
        let user = directory.load(user_id).await?;
        let limit = self.settings.tier_limit(user.tier);

        if let Err(err) = self.quota.check(&user.quota, limit) {
            return Err(self.reject_over_quota(user_id, user.tier, err));
        }

        let request = self.build_request(&params)?;
        let credentials = self.resolve_credentials(&user.credentials);
        let outcome = self.search(&credentials, &request, cancel).await?;

        let quota = match directory.record_search(user_id, &self.quota, limit).await {
            Ok(quota) => quota,
            Err(err @ SearchError::QuotaExceeded { .. }) => {
                return Err(self.reject_over_quota(user_id, user.tier, err))
            }
            Err(err) => return Err(err),
        };
        debug!(
            "User {} has made {} searches today",
            user_id, quota.searches_today
        );

        Ok(outcome)
    }

    fn reject_over_quota(&self, user_id: &str, tier: Tier, err: SearchError) -> SearchError {
        self.metrics.inc_quota_rejection();
        info!("User {} is over the {} daily limit", user_id, tier);
        err
    }

    /// Probe a key for one provider and save it on the user when it works
    pub async fn validate_credential(
        &self,
        directory: &dyn UserDirectory,
        user_id: &str,
        kind: ProviderKind,
        api_key: &str,
    ) -> Result<ProbeReport, SearchError> {
        directory.load(user_id).await?;

        let provider = self.pool.provider(kind, Some(api_key));
        if !provider.available() {
            return Err(SearchError::InvalidRequest(format!(
                "{} is disabled or the key is empty",
                kind
            )));
        }

        let report = provider.probe().await?;
        directory.store_credential(user_id, kind, api_key).await?;
        info!("Stored validated {} key for user {}", kind, user_id);
        Ok(report)
    }
}
