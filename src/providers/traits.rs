//! Provider traits and shared request/response types

use crate::error::{ProviderError, RateLimitOrigin, SearchError};
use crate::search::{ProviderResults, SearchRequest};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::error;

/// The closed set of upstream providers, in cascade order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// LLM that proposes research leads
    Suggestion,
    /// Retrieval-augmented answer engine with citations
    Answer,
    /// Classic web search engine
    Web,
}

impl ProviderKind {
    /// Cascade order: highest-value provider first
    pub const ALL: [ProviderKind; 3] = [Self::Suggestion, Self::Answer, Self::Web];

    /// Name reported in outcomes and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Suggestion => "openai",
            Self::Answer => "perplexity",
            Self::Web => "serpapi",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    /// Accepts either the role ("answer") or the provider name ("perplexity")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "suggestion" | "openai" => Ok(Self::Suggestion),
            "answer" | "perplexity" => Ok(Self::Answer),
            "web" | "serpapi" => Ok(Self::Web),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// Capability interface the orchestrator drives
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Whether a credential is configured; unavailable providers are skipped
    fn available(&self) -> bool;

    /// Run one search.
    ///
    /// Classified upstream failures come back as [`SearchError::Provider`];
    /// any other error is fatal to the whole search.
    async fn search(&self, request: &SearchRequest) -> Result<ProviderResults, SearchError>;
}

/// HTTP request to be made by a provider
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// URL to request
    pub url: String,
    /// HTTP method
    pub method: HttpMethod,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// Query parameters
    pub params: Vec<(String, String)>,
    /// JSON body
    pub body: Option<serde_json::Value>,
}

impl ProviderRequest {
    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            params: Vec::new(),
            body: None,
        }
    }

    /// Create a POST request
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            ..Self::get(url)
        }
    }

    /// Add a header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Add bearer-token authentication
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Add JSON body
    pub fn json(mut self, data: serde_json::Value) -> Self {
        self.body = Some(data);
        self
    }
}

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// HTTP response from a provider request
#[derive(Debug)]
pub struct ProviderResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub text: String,
    /// Response URL (after redirects)
    pub url: String,
}

impl ProviderResponse {
    /// Parse response as JSON, treating garbage as an upstream failure
    pub fn json(&self, provider: &str) -> Result<serde_json::Value, ProviderError> {
        serde_json::from_str(&self.text)
            .map_err(|_| ProviderError::upstream(provider, Some(self.status), "returned an invalid response"))
    }

    /// Check if response is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First 200 characters of the body, for logs
    pub fn excerpt(&self) -> &str {
        match self.text.char_indices().nth(200) {
            Some((idx, _)) => &self.text[..idx],
            None => &self.text,
        }
    }
}

/// Map an HTTP status to a classified provider error
pub fn check_status(provider: &str, response: &ProviderResponse) -> Result<(), ProviderError> {
    match response.status {
        401 => Err(ProviderError::CredentialRejected {
            provider: provider.to_string(),
        }),
        429 => Err(ProviderError::RateLimited {
            provider: provider.to_string(),
            origin: RateLimitOrigin::Upstream,
        }),
        status if status >= 400 => {
            error!(
                "{} responded with {}: {}",
                provider,
                status,
                response.excerpt()
            );
            Err(ProviderError::upstream(
                provider,
                Some(status),
                format!("HTTP {}", status),
            ))
        }
        _ => Ok(()),
    }
}

/// Result of a credential probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub provider: String,
    pub status: ProbeStatus,
    /// Models (or plan entries) the upstream advertised
    pub models_detected: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Linked,
}

/// Score for the result at `index` when the upstream gives none
pub fn default_score(index: usize) -> f64 {
    (0.9 - index as f64 * 0.1).max(0.3)
}

/// Best-effort parse of the date formats upstreams use
pub fn parse_published(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d", "%b %d, %Y", "%d %b %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Non-empty string field from a JSON object
pub(crate) fn str_field<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// String or numeric field rendered as text
pub(crate) fn id_field(value: &serde_json::Value, key: &str) -> Option<String> {
    match value.get(key)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
