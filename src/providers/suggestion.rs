//! LLM suggestion provider
//!
//! The upstream is an OpenAI-compatible chat model. It has no search index
//! and no relevance scores: it proposes related research queries, and each
//! one becomes a lead with a confidence that falls off by position.

use super::chat;
use super::context::ProviderContext;
use super::probe;
use super::traits::{ProbeReport, ProviderRequest, ProviderResponse};
use crate::error::{ProviderError, SearchError};
use crate::search::{ProviderResult, ProviderResults, SearchRequest};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const SOURCE_LABEL: &str = "Generated research lead";

/// Suggestion adapter
#[derive(Debug, Clone)]
pub struct SuggestionProvider {
    ctx: ProviderContext,
}

impl SuggestionProvider {
    pub fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ProviderContext {
        &self.ctx
    }

    /// Ask for a few more leads than needed, within 3..=8
    fn suggestion_count(requested: u32) -> u32 {
        requested.clamp(3, 8)
    }

    /// Build the chat-completions request
    pub fn build_request(&self, request: &SearchRequest) -> Result<ProviderRequest, SearchError> {
        let prompt = format!(
            "Based on this research query, suggest {} related queries that would help \
             expand the research.\n\nOriginal query: {}\n\nReturn only the queries, one per \
             line, without numbering.",
            Self::suggestion_count(request.requested_count()),
            request.query()
        );
        let body = chat::user_message_body(self.ctx.model(DEFAULT_MODEL), &prompt, 0.8, 200);
        chat::completion_request(&self.ctx, body)
    }

    /// Turn the completion into scored leads
    pub fn parse_response(
        &self,
        response: &ProviderResponse,
        request: &SearchRequest,
    ) -> Result<ProviderResults, ProviderError> {
        let payload = response.json(self.ctx.name())?;
        let content = chat::completion_content(&payload).unwrap_or_default();

        let results: Vec<ProviderResult> = parse_suggestions(&content)
            .into_iter()
            .take(request.requested_count() as usize)
            .enumerate()
            .map(|(idx, suggestion)| {
                let score = (0.85 - idx as f64 * 0.08).max(0.45);
                ProviderResult::new(format!("openai-{}", idx), suggestion.clone(), score, SOURCE_LABEL)
                    .with_url(Some(format!(
                        "https://www.google.com/search?q={}",
                        urlencoding::encode(&suggestion)
                    )))
                    .with_snippet(format!("Generated research lead: {}", suggestion))
                    .with_author(Some("AI research assistant".to_string()))
            })
            .collect();

        if results.is_empty() {
            return Err(ProviderError::upstream(
                self.ctx.name(),
                Some(response.status),
                "did not return related queries",
            ));
        }

        Ok(ProviderResults::new(None, results))
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

    /// Validate the key against the models listing
    pub async fn probe(&self) -> Result<ProbeReport, SearchError> {
        probe::probe_models(&self.ctx).await
    }

    /// Rewrite a query for better recall
    pub async fn enhance(&self, query: &str) -> Result<Option<String>, SearchError> {
        chat::enhance_with(&self.ctx, DEFAULT_MODEL, query).await
    }
}

/// One suggestion per non-empty line, without list markers or quotes
fn parse_suggestions(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| strip_marker(line.trim()).trim_matches('"').trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Drop a leading `1.`, `2)`, `-`, `*` or `•`
fn strip_marker(line: &str) -> &str {
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let rest = &line[digits..];
    let rest = if digits > 0 {
        match rest.strip_prefix(['.', ')']) {
            Some(stripped) => stripped,
            None => return line,
        }
    } else {
        rest.strip_prefix(['-', '*', '•']).unwrap_or(rest)
    };
    rest.trim_start()
}
