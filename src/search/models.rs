//! Search request, result and outcome data models

use crate::error::{EngineErrorEntry, SearchError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Search strategy hint passed through to providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Auto,
    Keyword,
    Neural,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Keyword => "keyword",
            Self::Neural => "neural",
        }
    }

    /// Lenient parse; anything unrecognised means `auto`
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "keyword" => Ok(Self::Keyword),
            "neural" => Ok(Self::Neural),
            other => Err(format!("unknown search type: {}", other)),
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated search request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    query: String,
    requested_count: u32,
    search_type: SearchType,
    enhance: bool,
}

impl SearchRequest {
    /// Validate and build a request.
    ///
    /// The query is trimmed and must not be empty. `requested_count` must be
    /// at least 1 and is capped at `max_results`.
    pub fn new(
        query: impl Into<String>,
        requested_count: u32,
        search_type: SearchType,
        enhance: bool,
        max_results: u32,
    ) -> Result<Self, SearchError> {
        let query = query.into().trim().to_string();
        if query.is_empty() {
            return Err(SearchError::InvalidRequest("query is required".to_string()));
        }
        if requested_count == 0 {
            return Err(SearchError::InvalidRequest(
                "requested result count must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            query,
            requested_count: requested_count.min(max_results.max(1)),
            search_type,
            enhance,
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn requested_count(&self) -> u32 {
        self.requested_count
    }

    pub fn search_type(&self) -> SearchType {
        self.search_type
    }

    pub fn enhance(&self) -> bool {
        self.enhance
    }

    /// Same parameters with a rewritten query
    pub fn with_query(&self, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..self.clone()
        }
    }
}

/// A single ranked result from a provider or the fallback synthesizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub snippet: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Relevance in [0, 1]
    pub score: f64,
    pub source_label: String,
}

impl ProviderResult {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        score: f64,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: None,
            snippet: String::new(),
            author: None,
            published_at: None,
            score: clamp_score(score),
            source_label: source_label.into(),
        }
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }

    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// What one provider returned; also the cached value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResults {
    pub answer: Option<String>,
    pub results: Vec<ProviderResult>,
}

impl ProviderResults {
    pub fn new(answer: Option<String>, results: Vec<ProviderResult>) -> Self {
        Self { answer, results }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Complete answer to one search call, handed to the caller for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub query: String,
    /// Query actually sent upstream when enhancement rewrote it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_query: Option<String>,
    pub answer: Option<String>,
    pub results: Vec<ProviderResult>,
    pub total_results: usize,
    pub execution_seconds: f64,
    pub engine_used: String,
    pub attempted_engines: Vec<String>,
    pub engine_errors: Vec<EngineErrorEntry>,
    pub is_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub search_type: SearchType,
    pub timestamp: DateTime<Utc>,
}

impl SearchOutcome {
    /// Build an outcome from a provider payload, keeping at most `limit` results
    pub fn from_results(
        query: impl Into<String>,
        search_type: SearchType,
        engine_used: impl Into<String>,
        mut payload: ProviderResults,
        limit: usize,
        timestamp: DateTime<Utc>,
    ) -> Self {
        payload.results.truncate(limit);
        Self {
            query: query.into(),
            executed_query: None,
            answer: payload.answer,
            total_results: payload.results.len(),
            results: payload.results,
            execution_seconds: 0.0,
            engine_used: engine_used.into(),
            attempted_engines: Vec::new(),
            engine_errors: Vec::new(),
            is_fallback: false,
            fallback_reason: None,
            search_type,
            timestamp,
        }
    }
}
