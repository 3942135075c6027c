//! In-process search metrics
//!
//! Tracks provider attempts, outcomes and latency, plus how often the
//! cascade fell back to synthetic results.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Response times kept per provider for the rolling average
const RESPONSE_TIME_WINDOW: usize = 100;

#[derive(Debug, Default)]
struct ProviderCounters {
    attempts: u64,
    successes: u64,
    errors: HashMap<String, u64>,
    response_times_ms: VecDeque<u64>,
}

/// Metrics registry shared by the orchestrator and the web layer
#[derive(Debug, Default)]
pub struct Metrics {
    total_searches: AtomicU64,
    fallbacks: AtomicU64,
    quota_rejections: AtomicU64,
    providers: RwLock<HashMap<String, ProviderCounters>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ProviderCounters>> {
        self.providers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ProviderCounters>> {
        self.providers.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn inc_search(&self) {
        self.total_searches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_quota_rejection(&self) {
        self.quota_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempt(&self, provider: &str) {
        self.write().entry(provider.to_string()).or_default().attempts += 1;
    }

    pub fn record_success(&self, provider: &str, time_ms: u64) {
        let mut providers = self.write();
        let counters = providers.entry(provider.to_string()).or_default();
        counters.successes += 1;
        push_time(counters, time_ms);
    }

    /// Record a classified failure under its kind, e.g. `rate_limited`
    pub fn record_error(&self, provider: &str, kind: &str, time_ms: u64) {
        let mut providers = self.write();
        let counters = providers.entry(provider.to_string()).or_default();
        *counters.errors.entry(kind.to_string()).or_insert(0) += 1;
        push_time(counters, time_ms);
    }

    pub fn total_searches(&self) -> u64 {
        self.total_searches.load(Ordering::Relaxed)
    }

    pub fn fallbacks(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    pub fn avg_response_time(&self, provider: &str) -> Option<u64> {
        self.read().get(provider).and_then(avg_time)
    }

    /// Share of finished attempts that succeeded, as a percentage
    pub fn reliability(&self, provider: &str) -> f64 {
        self.read().get(provider).map(reliability).unwrap_or(100.0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let providers = self
            .read()
            .iter()
            .map(|(name, counters)| {
                (
                    name.clone(),
                    ProviderStats {
                        attempts: counters.attempts,
                        successes: counters.successes,
                        errors: counters.errors.clone(),
                        avg_response_time_ms: avg_time(counters),
                        reliability: reliability(counters),
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            total_searches: self.total_searches(),
            fallbacks: self.fallbacks(),
            quota_rejections: self.quota_rejections.load(Ordering::Relaxed),
            providers,
        }
    }
}

fn push_time(counters: &mut ProviderCounters, time_ms: u64) {
    if counters.response_times_ms.len() >= RESPONSE_TIME_WINDOW {
        counters.response_times_ms.pop_front();
    }
    counters.response_times_ms.push_back(time_ms);
}

fn avg_time(counters: &ProviderCounters) -> Option<u64> {
    let times = &counters.response_times_ms;
    if times.is_empty() {
        None
    } else {
        Some(times.iter().sum::<u64>() / times.len() as u64)
    }
}

fn reliability(counters: &ProviderCounters) -> f64 {
    let errors: u64 = counters.errors.values().sum();
    let total = errors + counters.successes;
    if total == 0 {
        100.0
    } else {
        counters.successes as f64 / total as f64 * 100.0
    }
}

/// Statistics for a single provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub attempts: u64,
    pub successes: u64,
    pub errors: HashMap<String, u64>,
    pub avg_response_time_ms: Option<u64>,
    pub reliability: f64,
}

/// Point-in-time view served by `/stats`
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_searches: u64,
    pub fallbacks: u64,
    pub quota_rejections: u64,
    pub providers: HashMap<String, ProviderStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_counters() {
        let metrics = Metrics::new();

        metrics.inc_search();
        metrics.record_attempt("serpapi");
        metrics.record_success("serpapi", 100);
        metrics.record_attempt("serpapi");
        metrics.record_error("serpapi", "upstream", 300);

        assert_eq!(metrics.total_searches(), 1);
        assert_eq!(metrics.avg_response_time("serpapi"), Some(200));
        assert_eq!(metrics.reliability("serpapi"), 50.0);
        assert_eq!(metrics.reliability("openai"), 100.0);

        let snapshot = metrics.snapshot();
        let serp = &snapshot.providers["serpapi"];
        assert_eq!(serp.attempts, 2);
        assert_eq!(serp.errors["upstream"], 1);
    }

    #[test]
    fn test_response_time_window_is_bounded() {
        let metrics = Metrics::new();
        for _ in 0..RESPONSE_TIME_WINDOW {
            metrics.record_success("openai", 1000);
        }
        for _ in 0..RESPONSE_TIME_WINDOW {
            metrics.record_success("openai", 10);
        }
        assert_eq!(metrics.avg_response_time("openai"), Some(10));
    }
}
