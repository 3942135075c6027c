//! Credential probes
//!
//! A probe makes one cheap authenticated call to confirm a key works before
//! it is saved. Probes bypass the response cache and the rate limiter.

use super::context::ProviderContext;
use super::traits::{ProbeReport, ProbeStatus, ProviderRequest};
use crate::error::SearchError;
use serde_json::Value;
use tracing::info;

/// Probe an OpenAI-style `{base}/models` listing with a bearer token
pub(crate) async fn probe_models(ctx: &ProviderContext) -> Result<ProbeReport, SearchError> {
    let api_key = ctx.api_key()?;
    let request = ProviderRequest::get(ctx.endpoint("models")?).bearer(api_key);

    let response = ctx.send(request).await?;
    // An unreadable body after a 2xx still proves the key works
    let payload = response.json(ctx.name()).unwrap_or(Value::Null);

    let models = count_entries(payload.get("data").or_else(|| payload.get("models")));
    info!("{} key validated, {} models detected", ctx.name(), models);

    Ok(linked(ctx, models))
}

pub(crate) fn linked(ctx: &ProviderContext, models_detected: usize) -> ProbeReport {
    ProbeReport {
        provider: ctx.name().to_string(),
        status: ProbeStatus::Linked,
        models_detected,
    }
}

/// Length of a list, or number of values in a keyed object
pub(crate) fn count_entries(value: Option<&Value>) -> usize {
    match value {
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(map)) => map.len(),
        _ => 0,
    }
}
