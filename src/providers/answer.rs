//! Retrieval answer provider
//!
//! Talks to a Perplexity-compatible chat endpoint that answers the query and
//! returns the sources it cited. Citations arrive in several shapes
//! depending on the model: at the top level or under the first choice, as a
//! list or a keyed object, and as bare URLs or full records.

use super::chat;
use super::context::ProviderContext;
use super::probe;
use super::traits::{
    default_score, id_field, parse_published, str_field, ProbeReport, ProviderRequest,
    ProviderResponse,
};
use crate::error::{ProviderError, SearchError};
use crate::search::{ProviderResult, ProviderResults, SearchRequest};
use serde_json::{json, Value};

const DEFAULT_MODEL: &str = "sonar-pro";
const SOURCE_LABEL: &str = "Perplexity";
const SYSTEM_PROMPT: &str =
    "You are an AI research analyst. Provide concise answers and cite relevant sources when available.";

#[derive(Debug, Clone)]
pub struct AnswerProvider {
    ctx: ProviderContext,
}

impl AnswerProvider {
    pub fn new(ctx: ProviderContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ProviderContext {
        &self.ctx
    }

    fn top_k(requested: u32) -> u32 {
        requested.clamp(1, 20)
    }

    pub fn build_request(&self, request: &SearchRequest) -> Result<ProviderRequest, SearchError> {
        let body = json!({
            "model": self.ctx.model(DEFAULT_MODEL),
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": request.query()},
            ],
            "top_k": Self::top_k(request.requested_count()),
            "return_citations": true,
            "stream": false,
            "temperature": 0.2,
            "max_tokens": 800,
        });

        chat::completion_request(&self.ctx, body)
    }

    pub fn parse_response(
        &self,
        response: &ProviderResponse,
        request: &SearchRequest,
    ) -> Result<ProviderResults, ProviderError> {
        let payload = response.json(self.ctx.name())?;
        let top_k = Self::top_k(request.requested_count()) as usize;

        let results = citations(&payload)
            .into_iter()
            .take(top_k)
            .enumerate()
            .filter_map(|(idx, citation)| citation_result(idx, citation))
            .collect();

        Ok(ProviderResults::new(chat::completion_content(&payload), results))
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

    pub async fn probe(&self) -> Result<ProbeReport, SearchError> {
        probe::probe_models(&self.ctx).await
    }

    pub async fn enhance(&self, query: &str) -> Result<Option<String>, SearchError> {
        chat::enhance_with(&self.ctx, DEFAULT_MODEL, query).await
    }
}

/// Locate the citation list wherever the model put it
fn citations(payload: &Value) -> Vec<&Value> {
    let first_choice = payload.get("choices").and_then(|c| c.get(0));
    let found = [
        payload.get("citations"),
        first_choice.and_then(|c| c.get("citations")),
        first_choice
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("citations")),
    ]
    .into_iter()
    .flatten()
    .find(|v| match v {
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => false,
    });

    match found {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(map)) => map.values().collect(),
        _ => Vec::new(),
    }
}

fn citation_result(idx: usize, citation: &Value) -> Option<ProviderResult> {
    match citation {
        Value::String(url) if !url.trim().is_empty() => {
            let url = url.trim();
            Some(
                ProviderResult::new(format!("citation-{}", idx), url, default_score(idx), SOURCE_LABEL)
                    .with_url(Some(url.to_string())),
            )
        }
        Value::Object(_) => {
            let url = str_field(citation, "url").map(str::to_string);
            let id = id_field(citation, "id")
                .or_else(|| id_field(citation, "uuid"))
                .unwrap_or_else(|| format!("citation-{}", idx));
            let title = str_field(citation, "title")
                .map(str::to_string)
                .or_else(|| url.clone())
                .unwrap_or_else(|| format!("Result {}", idx + 1));
            let snippet = ["snippet", "content", "text"]
                .iter()
                .find_map(|key| str_field(citation, key))
                .unwrap_or_default();
            let published = str_field(citation, "published_at")
                .or_else(|| str_field(citation, "date"))
                .and_then(parse_published);
            let score = citation
                .get("score")
                .and_then(Value::as_f64)
                .unwrap_or_else(|| default_score(idx));
            let label = str_field(citation, "source").unwrap_or(SOURCE_LABEL);

            Some(
                ProviderResult::new(id, title, score, label)
                    .with_url(url)
                    .with_snippet(snippet)
                    .with_author(str_field(citation, "author").map(str::to_string))
                    .with_published_at(published),
            )
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResponseCache;
    use crate::error::{ProviderErrorKind, RateLimitOrigin};
    use crate::providers::context::{test_context, test_context_with};
    use crate::providers::ProviderKind;
    use crate::search::SearchType;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(count: u32) -> SearchRequest {
        SearchRequest::new("soil carbon sequestration", count, SearchType::Auto, false, 100).unwrap()
    }

    async fn provider_for(server: &MockServer) -> AnswerProvider {
        AnswerProvider::new(test_context(ProviderKind::Answer, &server.uri(), Some("pplx-test")))
    }

    #[test]
    fn test_citation_shapes() {
        let listed = json!({"citations": ["https://a.example", "https://b.example"]});
        assert_eq!(citations(&listed).len(), 2);

        let keyed = json!({
            "choices": [{"message": {"content": "x", "citations": {
                "first": {"url": "https://a.example"},
                "second": {"url": "https://b.example"},
            }}}]
        });
        assert_eq!(citations(&keyed).len(), 2);

        let on_choice = json!({"choices": [{"citations": [{"url": "https://c.example"}]}]});
        assert_eq!(citations(&on_choice).len(), 1);

        assert!(citations(&json!({"choices": []})).is_empty());
    }

    #[test]
    fn test_citation_defaults() {
        let result = citation_result(2, &json!({"url": "https://a.example/paper"})).unwrap();
        assert_eq!(result.id, "citation-2");
        assert_eq!(result.title, "https://a.example/paper");
        assert_eq!(result.source_label, "Perplexity");
        assert!((result.score - 0.7).abs() < 1e-9);

        let untitled = citation_result(0, &json!({"snippet": "text only"})).unwrap();
        assert_eq!(untitled.title, "Result 1");
        assert!(untitled.url.is_none());

        assert!(citation_result(0, &json!(42)).is_none());
    }

    #[tokio::test]
    async fn test_search_maps_answer_and_citations() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "sonar-pro",
                "top_k": 3,
                "return_citations": true,
                "stream": false,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Soils store carbon."}}],
                "citations": [
                    {
                        "id": "c1",
                        "title": "Soil carbon review",
                        "url": "https://journal.example/review",
                        "content": "A review of sequestration.",
                        "author": "Lal",
                        "published_at": "2023-04-01",
                        "score": 0.95,
                        "source": "Journal"
                    },
                    "https://agency.example/report"
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let results = provider.search(&request(3)).await.unwrap();

        assert_eq!(results.answer.as_deref(), Some("Soils store carbon."));
        assert_eq!(results.results.len(), 2);

        let first = &results.results[0];
        assert_eq!(first.id, "c1");
        assert_eq!(first.snippet, "A review of sequestration.");
        assert_eq!(first.author.as_deref(), Some("Lal"));
        assert_eq!(first.source_label, "Journal");
        assert!(first.published_at.is_some());
        assert!((first.score - 0.95).abs() < 1e-9);

        let second = &results.results[1];
        assert_eq!(second.url.as_deref(), Some("https://agency.example/report"));
        assert_eq!(second.source_label, "Perplexity");
    }

    #[tokio::test]
    async fn test_no_citations_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Nothing cited."}}]
            })))
            .mount(&server)
            .await;

        let results = provider_for(&server).await.search(&request(5)).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(results.answer.as_deref(), Some("Nothing cited."));
    }

    #[tokio::test]
    async fn test_repeat_query_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "cached"}}],
                "citations": ["https://a.example"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let first = provider.search(&request(5)).await.unwrap();
        let again = SearchRequest::new("  Soil   CARBON sequestration ", 5, SearchType::Auto, false, 100)
            .unwrap();
        let second = provider.search(&again).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cache_hits_spare_the_limiter_until_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "fresh"}}],
                "citations": ["https://a.example"]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let provider = AnswerProvider::new(test_context_with(
            ProviderKind::Answer,
            &server.uri(),
            Some("pplx-test"),
            ResponseCache::new(1, 10),
            2,
        ));

        provider.search(&request(5)).await.unwrap();
        // Served from cache; the second slot stays free
        provider.search(&request(5)).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
        provider.search(&request(5)).await.unwrap();

        // Both slots are now spent, so an uncached query never leaves the process
        match provider.search(&request(6)).await {
            Err(SearchError::Provider(err)) => assert!(matches!(
                err,
                ProviderError::RateLimited { origin: RateLimitOrigin::Local, .. }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upstream_throttling_and_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        match provider_for(&server).await.search(&request(5)).await {
            Err(SearchError::Provider(err)) => assert_eq!(err.kind(), ProviderErrorKind::RateLimited),
            other => panic!("unexpected {:?}", other),
        }

        let failing = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&failing)
            .await;

        match provider_for(&failing).await.search(&request(5)).await {
            Err(SearchError::Provider(err)) => assert_eq!(err.kind(), ProviderErrorKind::Upstream),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_local_limit_blocks_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .expect(1)
            .mount(&server)
            .await;

        let provider = AnswerProvider::new(test_context_with(
            ProviderKind::Answer,
            &server.uri(),
            Some("pplx-test"),
            ResponseCache::disabled(),
            1,
        ));

        assert!(provider.search(&request(5)).await.is_ok());
        match provider.search(&request(5)).await {
            Err(SearchError::Provider(ProviderError::RateLimited { origin, .. })) => {
                assert_eq!(origin, RateLimitOrigin::Local)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let provider = AnswerProvider::new(test_context(
            ProviderKind::Answer,
            "https://api.perplexity.ai",
            None,
        ));
        assert!(!provider.context().available());
        match provider.search(&request(5)).await {
            Err(SearchError::Provider(err)) => assert_eq!(err.kind(), ProviderErrorKind::NotConfigured),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_counts_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "sonar"}, {"id": "sonar-pro"}]
            })))
            .mount(&server)
            .await;

        let report = provider_for(&server).await.probe().await.unwrap();
        assert_eq!(report.provider, "perplexity");
        assert_eq!(report.models_detected, 2);
    }
}
