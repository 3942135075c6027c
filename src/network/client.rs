//! HTTP client for making requests to provider APIs

use crate::config::OutgoingSettings;
use crate::error::ProviderError;
use crate::providers::{HttpMethod, ProviderRequest, ProviderResponse};
use anyhow::Result;
use reqwest::{Client, Response};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// HTTP client wrapper shared by every provider adapter
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    user_agent: String,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self> {
        Self::with_settings(&OutgoingSettings::default())
    }

    /// Create a new HTTP client with custom settings
    pub fn with_settings(settings: &OutgoingSettings) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs_f64(settings.request_timeout))
            .pool_max_idle_per_host(settings.pool_maxsize)
            .gzip(true)
            .brotli(true);

        // SSL verification
        if !settings.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        // Proxy settings
        if let Some(ref proxy_url) = settings.proxies.all {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        } else {
            if let Some(ref http) = settings.proxies.http {
                builder = builder.proxy(reqwest::Proxy::http(http)?);
            }
            if let Some(ref https) = settings.proxies.https {
                builder = builder.proxy(reqwest::Proxy::https(https)?);
            }
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            user_agent: format!("research-search/{}", crate::VERSION),
        })
    }

    /// Execute a provider request, giving up after `limit`.
    ///
    /// Transport failures and timeouts come back as
    /// [`ProviderError::Connectivity`]; HTTP status codes are left for the
    /// caller to classify.
    pub async fn execute_with_timeout(
        &self,
        provider: &str,
        request: ProviderRequest,
        limit: Duration,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut req_builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        req_builder = req_builder
            .timeout(limit)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/json");

        for (key, value) in &request.headers {
            req_builder = req_builder.header(key, value);
        }

        if !request.params.is_empty() {
            req_builder = req_builder.query(&request.params);
        }

        if let Some(body) = request.body {
            req_builder = req_builder.json(&body);
        }

        debug!("{} {:?} {}", provider, request.method, request.url);

        let call = async {
            let response = req_builder.send().await?;
            Self::parse_response(response).await
        };

        match timeout(limit, call).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(classify_transport_error(provider, &e, limit)),
            Err(_) => Err(timed_out(provider, limit)),
        }
    }

    /// Parse response into ProviderResponse
    async fn parse_response(response: Response) -> reqwest::Result<ProviderResponse> {
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let text = response.text().await?;

        Ok(ProviderResponse { status, text, url })
    }
}

fn timed_out(provider: &str, limit: Duration) -> ProviderError {
    ProviderError::connectivity(
        provider,
        format!("timed out after {:.1}s", limit.as_secs_f64()),
    )
}

fn classify_transport_error(provider: &str, err: &reqwest::Error, limit: Duration) -> ProviderError {
    if err.is_timeout() {
        timed_out(provider, limit)
    } else if err.is_connect() {
        ProviderError::connectivity(provider, format!("unable to connect: {}", err))
    } else {
        ProviderError::connectivity(provider, format!("request failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_client_creation() {
        let client = HttpClient::new();
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_execute_sends_headers_and_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "rust"))
            .and(header("authorization", "Bearer token"))
            .and(header("user-agent", format!("research-search/{}", crate::VERSION).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let request = ProviderRequest::get(format!("{}/search", server.uri()))
            .param("q", "rust")
            .bearer("token");
        let response = client
            .execute_with_timeout("test", request, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.text, "{}");
    }

    #[tokio::test]
    async fn test_timeout_is_connectivity_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let err = client
            .execute_with_timeout(
                "slow",
                ProviderRequest::get(server.uri()),
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ProviderErrorKind::Connectivity);
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connectivity_error() {
        let client = HttpClient::new().unwrap();
        let err = client
            .execute_with_timeout(
                "offline",
                ProviderRequest::get("http://127.0.0.1:9/"),
                Duration::from_secs(2),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ProviderErrorKind::Connectivity);
    }
}
