//! Mapping of search errors onto HTTP responses

use crate::error::{ProviderError, SearchError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub enum ApiError {
    /// No `x-user-id` header on a user-scoped route
    MissingUser,
    /// Per-user endpoint limit hit
    Throttled,
    Search(SearchError),
}

impl From<SearchError> for ApiError {
    fn from(err: SearchError) -> Self {
        Self::Search(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingUser => StatusCode::UNAUTHORIZED,
            Self::Throttled => StatusCode::TOO_MANY_REQUESTS,
            Self::Search(err) => search_status(err),
        }
    }
}

fn search_status(err: &SearchError) -> StatusCode {
    match err {
        SearchError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        SearchError::AllProvidersFailed { .. } => StatusCode::BAD_GATEWAY,
        SearchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        SearchError::UnknownUser(_) => StatusCode::NOT_FOUND,
        SearchError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SearchError::Cancelled => StatusCode::REQUEST_TIMEOUT,
        // Only credential probes surface a single provider's failure
        SearchError::Provider(err) => match err {
            ProviderError::NotConfigured { .. } | ProviderError::CredentialRejected { .. } => {
                StatusCode::BAD_REQUEST
            }
            ProviderError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ProviderError::Connectivity { .. } | ProviderError::Upstream { .. } => {
                StatusCode::BAD_GATEWAY
            }
        },
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::MissingUser => json!({"error": "missing user identity"}),
            Self::Throttled => json!({"error": "too many search requests, slow down"}),
            Self::Search(SearchError::AllProvidersFailed { errors }) => json!({
                "error": "all search providers failed",
                "engine_errors": errors,
            }),
            Self::Search(SearchError::Provider(err)) => json!({
                "error": err.to_string(),
                "kind": err.kind(),
            }),
            Self::Search(SearchError::Configuration(message)) => {
                error!("Configuration error: {}", message);
                json!({"error": "service misconfigured"})
            }
            Self::Search(err) => json!({"error": err.to_string()}),
        };

        (status, Json(body)).into_response()
    }
}
