//! Web search provider (SerpAPI-compatible)

use super::context::ProviderContext;
use super::probe;
use super::traits::{
    default_score, id_field, parse_published, str_field, ProbeReport, ProviderRequest,
    ProviderResponse,
};
use crate::error::{ProviderError, SearchError};
use crate::search::{ProviderResult, ProviderResults, SearchRequest};
use serde_json::Value;
use tracing::info;

const DEFAULT_ENGINE: &str = "google";
const SOURCE_LABEL: &str = "SerpAPI";

#[derive(Debug, Clone)]
pub struct WebProvider {
    ctx: ProviderContext,
}

impl WebProvider {
    pub fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ProviderContext {
        &self.ctx
    }

    fn num(requested: u32) -> u32 {
        requested.clamp(1, 10)
    }

    fn engine(&self) -> &str {
        self.ctx.settings().engine.as_deref().unwrap_or(DEFAULT_ENGINE)
    }

    pub fn build_request(&self, request: &SearchRequest) -> Result<ProviderRequest, SearchError> {
        let api_key = self.ctx.api_key()?;

        Ok(ProviderRequest::get(self.ctx.endpoint("search")?)
            .param("engine", self.engine())
            .param("api_key", api_key)
            .param("q", request.query())
            .param("num", Self::num(request.requested_count()).to_string()))
    }

    pub fn parse_response(
        &self,
        response: &ProviderResponse,
        request: &SearchRequest,
    ) -> Result<ProviderResults, ProviderError> {
        let payload = response.json(self.ctx.name())?;

        // SerpAPI reports some failures in a 200 body
        if let Some(message) = str_field(&payload, "error") {
            if payload.get("organic_results").is_none() {
                return Err(ProviderError::upstream(
                    self.ctx.name(),
                    Some(response.status),
                    message,
                ));
            }
        }

        let results = payload
            .get("organic_results")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .take(request.requested_count() as usize)
                    .enumerate()
                    .map(|(idx, item)| organic_result(idx, item))
                    .collect()
            })
            .unwrap_or_default();

        let answer = payload
            .get("answer_box")
            .and_then(|b| str_field(b, "answer"))
            .map(str::to_string);

        Ok(ProviderResults::new(answer, results))
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<ProviderResults, SearchError> {
        let http = self.build_request(request)?;
        self.ctx
            .cached(request, || async {
                let response = self.ctx.send(http).await?;
                Ok(self.parse_response(&response, request)?)
            })
            .await
    }

    /// Validate the key against the account endpoint
    pub async fn probe(&self) -> Result<ProbeReport, SearchError> {
        let api_key = self.ctx.api_key()?;
        let request = ProviderRequest::get(self.ctx.endpoint("account")?).param("api_key", api_key);

        self.ctx.send(request).await?;
        info!("{} key validated", self.ctx.name());

        Ok(probe::linked(&self.ctx, 0))
    }
}

fn organic_result(idx: usize, item: &Value) -> ProviderResult {
    let url = str_field(item, "link").map(str::to_string);
    let id = id_field(item, "position").unwrap_or_else(|| format!("serpapi-{}", idx));
    let title = str_field(item, "title")
        .map(str::to_string)
        .or_else(|| url.clone())
        .unwrap_or_else(|| format!("Result {}", idx + 1));
    let snippet = str_field(item, "snippet")
        .or_else(|| str_field(item, "excerpt"))
        .unwrap_or_default();
    let score = item
        .get("score")
        .and_then(Value::as_f64)
        .unwrap_or_else(|| default_score(idx));

    ProviderResult::new(id, title, score, SOURCE_LABEL)
        .with_url(url)
        .with_snippet(snippet)
        .with_author(str_field(item, "source").map(str::to_string))
        .with_published_at(str_field(item, "date").and_then(parse_published))
}
