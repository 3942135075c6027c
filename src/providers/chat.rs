//! Chat-completions helpers shared by the suggestion and answer adapters

use super::context::ProviderContext;
use super::traits::ProviderRequest;
use crate::error::SearchError;
use serde_json::{json, Value};

/// Prompt used to rewrite a query when enhancement is requested
pub(crate) fn enhancement_prompt(query: &str) -> String {
    format!(
        "You are a research assistant. Enhance this search query to make it more effective \
         for academic and professional research. Add relevant keywords and phrases while \
         keeping the original intent.\n\nOriginal query: {}\n\nReturn only the enhanced query \
         without explanation.",
        query
    )
}

/// Build an authenticated POST to `{base}/chat/completions`
pub(crate) fn completion_request(
    ctx: &ProviderContext,
    body: Value,
) -> Result<ProviderRequest, SearchError> {
    let api_key = ctx.api_key()?;
    let url = ctx.endpoint("chat/completions")?;

    Ok(ProviderRequest::post(url)
        .bearer(api_key)
        .header("Content-Type", "application/json")
        .json(body))
}

/// Minimal chat body with a single user message
pub(crate) fn user_message_body(model: &str, prompt: &str, temperature: f64, max_tokens: u32) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": prompt}],
        "temperature": temperature,
        "max_tokens": max_tokens,
    })
}

/// Text of `choices[0].message.content`, if non-empty
pub(crate) fn completion_content(payload: &Value) -> Option<String> {
    payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Send an enhancement prompt and return the rewritten query, if any.
///
/// Consumes a rate-limit slot; never cached.
pub(crate) async fn enhance_with(
    ctx: &ProviderContext,
    default_model: &str,
    query: &str,
) -> Result<Option<String>, SearchError> {
    let body = user_message_body(ctx.model(default_model), &enhancement_prompt(query), 0.7, 150);
    let request = completion_request(ctx, body)?;
    ctx.acquire()?;

    let response = ctx.send(request).await?;
    let payload = response.json(ctx.name())?;
    Ok(completion_content(&payload)
        .map(|text| text.trim_matches('"').trim().to_string())
        .filter(|text| !text.is_empty()))
}
