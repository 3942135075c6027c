//! Error types shared across the crate

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a rate-limit rejection came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitOrigin {
    /// The in-process fixed-window limiter refused the call
    Local,
    /// The upstream answered HTTP 429
    Upstream,
}

/// Classified failure of a single provider call.
///
/// The orchestrator recovers from every variant by moving on to the next
/// provider; the message text keeps the causes apart for operators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("{provider} integration is not configured")]
    NotConfigured { provider: String },

    #[error("{provider} rejected the API key")]
    CredentialRejected { provider: String },

    #[error("{provider} connectivity error: {message}")]
    Connectivity { provider: String, message: String },

    #[error("{}", rate_limit_message(.provider, .origin))]
    RateLimited {
        provider: String,
        origin: RateLimitOrigin,
    },

    #[error("{provider} could not complete the request: {message}")]
    Upstream {
        provider: String,
        status: Option<u16>,
        message: String,
    },
}

fn rate_limit_message(provider: &str, origin: &RateLimitOrigin) -> String {
    match origin {
        RateLimitOrigin::Local => {
            format!("{provider} local rate limit exceeded, wait before retrying")
        }
        RateLimitOrigin::Upstream => format!("{provider} rate limit reached (HTTP 429)"),
    }
}

impl ProviderError {
    /// Name of the provider that failed
    pub fn provider(&self) -> &str {
        match self {
            Self::NotConfigured { provider }
            | Self::CredentialRejected { provider }
            | Self::Connectivity { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Upstream { provider, .. } => provider,
        }
    }

    /// Coarse category recorded alongside the message
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::NotConfigured { .. } => ProviderErrorKind::NotConfigured,
            Self::CredentialRejected { .. } => ProviderErrorKind::CredentialRejected,
            Self::Connectivity { .. } => ProviderErrorKind::Connectivity,
            Self::RateLimited { .. } => ProviderErrorKind::RateLimited,
            Self::Upstream { .. } => ProviderErrorKind::Upstream,
        }
    }

    pub(crate) fn upstream(provider: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider: provider.to_string(),
            status,
            message: message.into(),
        }
    }

    pub(crate) fn connectivity(provider: &str, message: impl Into<String>) -> Self {
        Self::Connectivity {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

/// Category of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    NotConfigured,
    CredentialRejected,
    Connectivity,
    RateLimited,
    Upstream,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::CredentialRejected => "credential_rejected",
            Self::Connectivity => "connectivity",
            Self::RateLimited => "rate_limited",
            Self::Upstream => "upstream",
        }
    }
}

/// One failed provider attempt, as reported in a search outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineErrorEntry {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl From<&ProviderError> for EngineErrorEntry {
    fn from(err: &ProviderError) -> Self {
        Self {
            provider: err.provider().to_string(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Errors surfaced to callers of the search layer
#[derive(Debug, Error)]
pub enum SearchError {
    /// Recoverable provider failure; never escapes the orchestrator
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("daily search limit of {limit} exceeded")]
    QuotaExceeded { limit: i64 },

    #[error("all search providers failed ({} attempt(s))", .errors.len())]
    AllProvidersFailed { errors: Vec<EngineErrorEntry> },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid search request: {0}")]
    InvalidRequest(String),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("search cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_distinguish_causes() {
        let local = ProviderError::RateLimited {
            provider: "serpapi".to_string(),
            origin: RateLimitOrigin::Local,
        };
        let upstream = ProviderError::RateLimited {
            provider: "serpapi".to_string(),
            origin: RateLimitOrigin::Upstream,
        };
        let rejected = ProviderError::CredentialRejected {
            provider: "serpapi".to_string(),
        };

        assert!(local.to_string().contains("local rate limit"));
        assert!(upstream.to_string().contains("429"));
        assert!(rejected.to_string().contains("rejected the API key"));
        assert_ne!(local.to_string(), upstream.to_string());
    }

    #[test]
    fn test_entry_from_provider_error() {
        let err = ProviderError::upstream("perplexity", Some(500), "HTTP 500");
        let entry = EngineErrorEntry::from(&err);

        assert_eq!(entry.provider, "perplexity");
        assert_eq!(entry.kind, ProviderErrorKind::Upstream);
        assert!(entry.message.starts_with("perplexity"));
    }
}
