//! Sequential provider cascade

use super::models::{SearchOutcome, SearchRequest};
use crate::clock::{self, Clock};
use crate::error::{EngineErrorEntry, SearchError};
use crate::fallback::{FallbackSynthesizer, DEFAULT_REASON};
use crate::metrics::Metrics;
use crate::providers::SearchProvider;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tries providers in order and returns the first success.
///
/// Holds no per-search state; one orchestrator serves every request.
#[derive(Clone)]
pub struct SearchOrchestrator {
    fallback_enabled: bool,
    synthesizer: FallbackSynthesizer,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<Metrics>>,
}

impl SearchOrchestrator {
    pub fn new(fallback_enabled: bool) -> Self {
        Self::with_clock(fallback_enabled, clock::system())
    }

    pub fn with_clock(fallback_enabled: bool, clock: Arc<dyn Clock>) -> Self {
        Self {
            fallback_enabled,
            synthesizer: FallbackSynthesizer::with_clock(clock.clone()),
            clock,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback_enabled
    }

    /// Run the cascade over `providers`, in the order given
    pub async fn search<P: SearchProvider>(
        &self,
        request: &SearchRequest,
        providers: &[P],
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, SearchError> {
        self.run(request, request.query(), providers, cancel).await
    }

    /// Run the cascade for a rewritten request.
    ///
    /// Offline previews still describe `original_query`, the text the user typed.
    pub async fn search_rewritten<P: SearchProvider>(
        &self,
        request: &SearchRequest,
        original_query: &str,
        providers: &[P],
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, SearchError> {
        self.run(request, original_query, providers, cancel).await
    }

    async fn run<P: SearchProvider>(
        &self,
        request: &SearchRequest,
        fallback_query: &str,
        providers: &[P],
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome, SearchError> {
        let started = Instant::now();
        let mut attempted: Vec<String> = Vec::new();
        let mut errors: Vec<EngineErrorEntry> = Vec::new();

        if let Some(metrics) = &self.metrics {
            metrics.inc_search();
        }

        for provider in providers {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }
            if !provider.available() {
                debug!("Skipping {}: not configured", provider.name());
                continue;
            }

            attempted.push(provider.name().to_string());
            self.record(|m| m.record_attempt(provider.name()));
            let call_started = Instant::now();

            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(SearchError::Cancelled),
                result = provider.search(request) => result,
            };
            let elapsed_ms = call_started.elapsed().as_millis() as u64;

            match result {
                Ok(payload) => {
                    self.record(|m| m.record_success(provider.name(), elapsed_ms));
                    info!(
                        "{} answered '{}' with {} results",
                        provider.name(),
                        request.query(),
                        payload.results.len()
                    );

                    let mut outcome = SearchOutcome::from_results(
                        request.query(),
                        request.search_type(),
                        provider.name(),
                        payload,
                        request.requested_count() as usize,
                        self.clock.now(),
                    );
                    outcome.attempted_engines = attempted;
                    outcome.engine_errors = errors;
                    outcome.execution_seconds = started.elapsed().as_secs_f64();
                    return Ok(outcome);
                }
                Err(SearchError::Provider(err)) => {
                    warn!("{} failed: {}", provider.name(), err);
                    let entry = EngineErrorEntry::from(&err);
                    self.record(|m| m.record_error(provider.name(), entry.kind.as_str(), elapsed_ms));
                    errors.push(entry);
                }
                Err(fatal) => return Err(fatal),
            }
        }

        if !self.fallback_enabled {
            return Err(SearchError::AllProvidersFailed { errors });
        }

        let reason = fallback_reason(&errors);
        self.record(Metrics::inc_fallback);

        let mut outcome =
            self.synthesizer
                .synthesize(fallback_query, request.requested_count(), &reason);
        outcome.search_type = request.search_type();
        outcome.attempted_engines = attempted;
        outcome.engine_errors = errors;
        outcome.execution_seconds = started.elapsed().as_secs_f64();
        Ok(outcome)
    }

    fn record(&self, f: impl FnOnce(&Metrics)) {
        if let Some(metrics) = &self.metrics {
            f(metrics);
        }
    }
}

/// `provider: message` per failure, or the default when nothing was tried
fn fallback_reason(errors: &[EngineErrorEntry]) -> String {
    if errors.is_empty() {
        return DEFAULT_REASON.to_string();
    }
    errors
        .iter()
        .map(|e| format!("{}: {}", e.provider, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{ProviderError, ProviderErrorKind, RateLimitOrigin};
    use crate::search::{ProviderResult, ProviderResults, SearchType};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    enum Behavior {
        Succeed(usize),
        Fail(ProviderError),
        FailAfter(Duration),
        Fatal,
        Hang,
    }

    struct StubProvider {
        name: &'static str,
        available: bool,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn new(name: &'static str, behavior: Behavior) -> Self {
            Self {
                name,
                available: true,
                behavior,
                calls: AtomicUsize::new(0),
            }
        }

        fn unavailable(name: &'static str) -> Self {
            Self {
                available: false,
                ..Self::new(name, Behavior::Succeed(1))
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchProvider for StubProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn available(&self) -> bool {
            self.available
        }

        async fn search(&self, _request: &SearchRequest) -> Result<ProviderResults, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Succeed(n) => Ok(ProviderResults::new(
                    Some(format!("{} answer", self.name)),
                    (0..*n)
                        .map(|i| ProviderResult::new(format!("{}-{}", self.name, i), "t", 0.5, self.name))
                        .collect(),
                )),
                Behavior::Fail(err) => Err(err.clone().into()),
                Behavior::FailAfter(delay) => {
                    tokio::time::sleep(*delay).await;
                    Err(upstream(self.name).into())
                }
                Behavior::Fatal => Err(SearchError::Configuration("bad base url".to_string())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(ProviderResults::default())
                }
            }
        }
    }

    fn orchestrator(fallback: bool) -> SearchOrchestrator {
        SearchOrchestrator::with_clock(fallback, Arc::new(ManualClock::new(Utc::now())))
    }

    fn request(count: u32) -> SearchRequest {
        SearchRequest::new("climate policy", count, SearchType::Neural, false, 100).unwrap()
    }

    fn upstream(provider: &str) -> ProviderError {
        ProviderError::Upstream {
            provider: provider.to_string(),
            status: Some(500),
            message: "boom".to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let providers = vec![
            StubProvider::new("A", Behavior::Succeed(3)),
            StubProvider::new("B", Behavior::Succeed(3)),
        ];
        let outcome = orchestrator(true)
            .search(&request(10), &providers, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.engine_used, "A");
        assert_eq!(outcome.attempted_engines, vec!["A"]);
        assert!(outcome.engine_errors.is_empty());
        assert!(!outcome.is_fallback);
        assert_eq!(outcome.search_type, SearchType::Neural);
        assert_eq!(providers[1].calls(), 0);
    }

    #[tokio::test]
    async fn test_errors_recorded_and_unavailable_skipped() {
        let providers = vec![
            StubProvider::unavailable("A"),
            StubProvider::new(
                "B",
                Behavior::Fail(ProviderError::RateLimited {
                    provider: "B".to_string(),
                    origin: RateLimitOrigin::Upstream,
                }),
            ),
            StubProvider::new("C", Behavior::Succeed(4)),
        ];
        let outcome = orchestrator(true)
            .search(&request(10), &providers, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.engine_used, "C");
        assert_eq!(outcome.attempted_engines, vec!["B", "C"]);
        assert_eq!(outcome.engine_errors.len(), 1);
        assert_eq!(outcome.engine_errors[0].provider, "B");
        assert_eq!(outcome.engine_errors[0].kind, ProviderErrorKind::RateLimited);
        assert_eq!(outcome.results.len(), 4);
        assert_eq!(providers[0].calls(), 0);
    }

    #[tokio::test]
    async fn test_results_truncated_to_requested_count() {
        let providers = vec![StubProvider::new("A", Behavior::Succeed(8))];
        let outcome = orchestrator(true)
            .search(&request(3), &providers, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.total_results, 3);
    }

    #[tokio::test]
    async fn test_fatal_error_propagates() {
        let providers = vec![
            StubProvider::new("A", Behavior::Fatal),
            StubProvider::new("B", Behavior::Succeed(1)),
        ];
        let result = orchestrator(true)
            .search(&request(5), &providers, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(SearchError::Configuration(_))));
        assert_eq!(providers[1].calls(), 0);
    }

    #[tokio::test]
    async fn test_all_failed_falls_back_with_joined_reason() {
        let metrics = Arc::new(Metrics::new());
        let providers = vec![
            StubProvider::new("A", Behavior::Fail(upstream("A"))),
            StubProvider::new("B", Behavior::Fail(upstream("B"))),
        ];
        let outcome = orchestrator(true)
            .with_metrics(metrics.clone())
            .search(&request(10), &providers, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_fallback);
        assert_eq!(outcome.engine_used, "offline-fallback");
        assert_eq!(outcome.attempted_engines, vec!["A", "B"]);
        assert_eq!(outcome.engine_errors.len(), 2);
        assert_eq!(outcome.results.len(), 5);
        assert_eq!(outcome.search_type, SearchType::Neural);
        let reason = outcome.fallback_reason.unwrap();
        assert!(reason.starts_with("A: "));
        assert!(reason.contains("; B: "));

        assert_eq!(metrics.fallbacks(), 1);
        assert_eq!(metrics.snapshot().providers["A"].attempts, 1);
    }

    #[tokio::test]
    async fn test_nothing_available_uses_default_reason() {
        let providers = vec![StubProvider::unavailable("A"), StubProvider::unavailable("B")];
        let outcome = orchestrator(true)
            .search(&request(10), &providers, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_fallback);
        assert!(outcome.attempted_engines.is_empty());
        assert_eq!(outcome.fallback_reason.as_deref(), Some("All providers unavailable"));
    }

    #[tokio::test]
    async fn test_fallback_reports_time_spent_in_cascade() {
        let providers = vec![StubProvider::new(
            "A",
            Behavior::FailAfter(Duration::from_millis(120)),
        )];
        let outcome = orchestrator(true)
            .search(&request(3), &providers, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_fallback);
        assert!(outcome.execution_seconds >= 0.12);
    }

    #[tokio::test]
    async fn test_rewritten_search_falls_back_on_original_query() {
        let rewritten =
            SearchRequest::new("carbon border adjustment", 3, SearchType::Auto, true, 100).unwrap();
        let providers = vec![StubProvider::new("A", Behavior::Fail(upstream("A")))];

        let outcome = orchestrator(true)
            .search_rewritten(&rewritten, "carbon tax", &providers, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_fallback);
        assert_eq!(outcome.query, "carbon tax");
        assert!(outcome.results[0].title.contains("Carbon Tax"));
        assert!(outcome
            .results
            .iter()
            .all(|r| !r.title.contains("Border Adjustment")));
    }

    #[tokio::test]
    async fn test_fallback_disabled_reports_all_failures() {
        let providers = vec![
            StubProvider::new("A", Behavior::Fail(upstream("A"))),
            StubProvider::unavailable("B"),
        ];
        match orchestrator(false)
            .search(&request(10), &providers, &CancellationToken::new())
            .await
        {
            Err(SearchError::AllProvidersFailed { errors }) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].provider, "A");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let providers = vec![StubProvider::new("A", Behavior::Succeed(1))];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orchestrator(true).search(&request(5), &providers, &cancel).await;
        assert!(matches!(result, Err(SearchError::Cancelled)));
        assert_eq!(providers[0].calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_drops_in_flight_call() {
        let providers = vec![
            StubProvider::new("A", Behavior::Hang),
            StubProvider::new("B", Behavior::Succeed(1)),
        ];
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = orchestrator(true).search(&request(5), &providers, &cancel).await;

        assert!(matches!(result, Err(SearchError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(providers[1].calls(), 0);
    }
}
