//! Offline fallback results
//!
//! When every provider is unavailable or failed, the caller still gets a
//! well-formed outcome: a handful of clearly labelled preview results that
//! are deterministic for a given query and clock.

use crate::clock::{self, Clock};
use crate::search::{ProviderResult, ProviderResults, SearchOutcome, SearchType};
use chrono::Duration;
use std::sync::Arc;
use tracing::warn;

/// `engine_used` reported on synthesized outcomes
pub const FALLBACK_ENGINE: &str = "offline-fallback";

/// Reason used when no provider was even attempted
pub const DEFAULT_REASON: &str = "All providers unavailable";

const MAX_RESULTS: u32 = 5;
const SOURCE_LABEL: &str = "Offline preview";
const PREVIEW_BASE: &str = "https://offline.research.local/preview";
/// Nominal execution time of a synthesized outcome
const EXECUTION_SECONDS: f64 = 0.01;

#[derive(Clone)]
pub struct FallbackSynthesizer {
    clock: Arc<dyn Clock>,
}

impl FallbackSynthesizer {
    pub fn new() -> Self {
        Self::with_clock(clock::system())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Build a degraded outcome with between 1 and 5 preview results
    pub fn synthesize(&self, query: &str, requested_count: u32, reason: &str) -> SearchOutcome {
        let issued_at = self.clock.now();
        let count = requested_count.clamp(1, MAX_RESULTS);
        let encoded = urlencoding::encode(query);
        let title_query = title_case(query);

        warn!("Serving offline fallback for '{}': {}", query, reason);

        let results = (1..=count)
            .map(|position| {
                let score = (1.0 - f64::from(position - 1) * 0.12).max(0.3);
                ProviderResult::new(
                    format!("fallback-{}", position),
                    format!("Insight {}: {} snapshot", position, title_query),
                    score,
                    SOURCE_LABEL,
                )
                .with_url(Some(format!("{}/{}/{}", PREVIEW_BASE, encoded, position)))
                .with_snippet(format!(
                    "Placeholder finding #{} generated while live search is unavailable. \
                     Replace once a provider responds for \"{}\".",
                    position, query
                ))
                .with_author(Some("Offline preview engine".to_string()))
                .with_published_at(Some(issued_at - Duration::days(i64::from(position))))
            })
            .collect();

        let answer = format!(
            "Preview insights for \"{}\" while live providers are unavailable.",
            query
        );

        let mut outcome = SearchOutcome::from_results(
            query,
            SearchType::Auto,
            FALLBACK_ENGINE,
            ProviderResults::new(Some(answer), results),
            MAX_RESULTS as usize,
            issued_at,
        );
        outcome.execution_seconds = EXECUTION_SECONDS;
        outcome.is_fallback = true;
        outcome.fallback_reason = Some(reason.to_string());
        outcome
    }
}

impl Default for FallbackSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Capitalize the first letter of every word and lowercase the rest
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}
