//! HTTP request handlers

use super::error::ApiError;
use super::state::AppState;
use crate::error::SearchError;
use crate::providers::{ProviderCredentials, ProviderKind};
use crate::search::SearchParams;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Header carrying the authenticated user id
pub const USER_HEADER: &str = "x-user-id";

fn user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Search handler
pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(params): Json<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers).ok_or(ApiError::MissingUser)?;

    // Only known users get a limiter entry
    state.directory.load(&user_id).await?;
    if state.search_limiter.check_key(&user_id).is_err() {
        info!("Throttled search endpoint for user {}", user_id);
        return Err(ApiError::Throttled);
    }

    // Dropping the handler future (client gone) cancels the cascade
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let span = info_span!("search", request_id = %Uuid::new_v4(), user = %user_id);
    let outcome = state
        .service
        .perform_search(state.directory.as_ref(), &user_id, params, &cancel)
        .instrument(span)
        .await?;

    Ok(Json(outcome))
}

/// Provider availability, for the caller when identified
pub async fn providers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_credentials = match user_id(&headers) {
        Some(id) => state.directory.load(&id).await?.credentials,
        None => ProviderCredentials::default(),
    };
    let credentials = state.service.resolve_credentials(&user_credentials);

    Ok(Json(json!({
        "providers": state.service.pool().describe(&credentials),
        "fallback_enabled": state.settings().search.fallback_enabled,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ValidateBody {
    pub api_key: String,
}

/// Probe a key and save it on the user when the upstream accepts it
pub async fn validate_provider(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<ValidateBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers).ok_or(ApiError::MissingUser)?;
    let kind: ProviderKind = name.parse().map_err(SearchError::InvalidRequest)?;

    let report = state
        .service
        .validate_credential(state.directory.as_ref(), &user_id, kind, &body.api_key)
        .await?;

    Ok(Json(report))
}

/// Metrics snapshot
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "instance_name": state.instance_name(),
        "metrics": state.service.metrics().snapshot(),
        "cached_entries": state.service.pool().cached_entries(),
    }))
}

/// Health check handler
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}
