//! Settings structures for research-search configuration

use crate::error::SearchError;
use crate::quota::{Tier, UNLIMITED};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use url::Url;

/// Main settings structure, loaded from settings.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub server: ServerSettings,
    pub search: SearchSettings,
    pub cache: CacheSettings,
    pub outgoing: OutgoingSettings,
    pub providers: ProvidersSettings,
    pub tiers: HashMap<Tier, TierSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            server: ServerSettings::default(),
            search: SearchSettings::default(),
            cache: CacheSettings::default(),
            outgoing: OutgoingSettings::default(),
            providers: ProvidersSettings::default(),
            tiers: default_tiers(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse settings from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)?;
        Ok(settings)
    }

    /// Merge with process environment variables
    pub fn merge_env(&mut self) {
        self.merge_env_from(|key| std::env::var(key).ok());
    }

    /// Merge with variables provided by `lookup`
    pub fn merge_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("RESEARCH_DEBUG") {
            self.general.debug = val.parse().unwrap_or(false);
        }
        if let Some(val) = lookup("RESEARCH_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Some(val) = lookup("RESEARCH_BIND_ADDRESS") {
            self.server.bind_address = val;
        }
        if let Some(val) = lookup("RESEARCH_FALLBACK_ENABLED") {
            self.search.fallback_enabled = !matches!(
                val.trim().to_lowercase().as_str(),
                "0" | "false" | "no"
            );
        }
        if let Some(val) = lookup("OPENAI_API_KEY") {
            self.providers.suggestion.api_key = Some(val);
        }
        if let Some(val) = lookup("PERPLEXITY_API_KEY") {
            self.providers.answer.api_key = Some(val);
        }
        if let Some(val) = lookup("PERPLEXITY_SHARED_API_KEY") {
            self.providers.answer.shared_api_key = Some(val);
        }
        if let Some(val) = lookup("PERPLEXITY_API_BASE_URL") {
            self.providers.answer.base_url = val;
        }
        if let Some(val) = lookup("SERPAPI_API_KEY") {
            self.providers.web.api_key = Some(val);
        }
    }

    /// Reject settings that cannot work at all
    pub fn validate(&self) -> std::result::Result<(), SearchError> {
        for (name, provider) in self.providers.iter() {
            provider.parsed_base_url(name)?;
            if provider.timeout <= 0.0 {
                return Err(SearchError::Configuration(format!(
                    "{} timeout must be positive",
                    name
                )));
            }
            if provider.rate_limit_per_minute == 0 {
                return Err(SearchError::Configuration(format!(
                    "{} rate_limit_per_minute must be positive",
                    name
                )));
            }
        }
        if self.search.max_results == 0 {
            return Err(SearchError::Configuration(
                "search.max_results must be positive".to_string(),
            ));
        }
        if self.server.search_requests_per_minute == 0 {
            return Err(SearchError::Configuration(
                "server.search_requests_per_minute must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Daily search limit for a tier; -1 means unlimited
    pub fn tier_limit(&self, tier: Tier) -> i64 {
        self.tiers
            .get(&tier)
            .map(|t| t.daily_searches)
            .unwrap_or_else(|| default_tier_limit(tier))
    }

    /// Effective cache TTL for a provider
    pub fn cache_ttl(&self, provider: &ProviderSettings) -> u64 {
        provider.cache_ttl.unwrap_or(self.cache.ttl_seconds)
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Enable debug logging
    pub debug: bool,
    /// Instance name reported by the API
    pub instance_name: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            debug: false,
            instance_name: "research-search".to_string(),
        }
    }
}

/// HTTP API server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub bind_address: String,
    /// Per-user ceiling on the search endpoint
    pub search_requests_per_minute: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8888,
            bind_address: "127.0.0.1".to_string(),
            search_requests_per_minute: 20,
        }
    }
}

/// Search behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Result count used when the caller does not ask for one
    pub default_results: u32,
    /// Hard ceiling on requested result counts
    pub max_results: u32,
    /// Synthesize offline results when every provider fails
    pub fallback_enabled: bool,
    /// Honour `enhance` requests
    pub enable_query_enhancement: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_results: 10,
            max_results: 100,
            fallback_enabled: true,
            enable_query_enhancement: true,
        }
    }
}

/// Response cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// TTL used by providers without their own `cache_ttl`
    pub ttl_seconds: u64,
    /// Entries kept per provider
    pub max_capacity: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: crate::cache::DEFAULT_TTL_SECONDS,
            max_capacity: crate::cache::DEFAULT_MAX_CAPACITY,
        }
    }
}

/// Outgoing request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingSettings {
    /// Default request timeout in seconds
    pub request_timeout: f64,
    /// Idle connections kept per host
    pub pool_maxsize: usize,
    /// Verify SSL certificates
    pub verify_ssl: bool,
    /// Proxy settings
    pub proxies: ProxySettings,
}

impl Default for OutgoingSettings {
    fn default() -> Self {
        Self {
            request_timeout: 30.0,
            pool_maxsize: 20,
            verify_ssl: true,
            proxies: ProxySettings::default(),
        }
    }
}

/// Proxy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub all: Option<String>,
}

/// The three upstream providers, in cascade order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersSettings {
    /// LLM suggestion provider (OpenAI-compatible)
    pub suggestion: ProviderSettings,
    /// Retrieval answer provider (Perplexity-compatible)
    pub answer: ProviderSettings,
    /// Web search provider (SerpAPI-compatible)
    pub web: ProviderSettings,
}

impl Default for ProvidersSettings {
    fn default() -> Self {
        Self {
            suggestion: ProviderSettings {
                base_url: "https://api.openai.com/v1".to_string(),
                model: Some("gpt-4o-mini".to_string()),
                timeout: 20.0,
                ..Default::default()
            },
            answer: ProviderSettings {
                base_url: "https://api.perplexity.ai".to_string(),
                model: Some("sonar-pro".to_string()),
                timeout: 30.0,
                ..Default::default()
            },
            web: ProviderSettings {
                base_url: "https://serpapi.com".to_string(),
                engine: Some("google".to_string()),
                timeout: 12.0,
                ..Default::default()
            },
        }
    }
}

impl ProvidersSettings {
    /// Iterate `(section name, settings)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ProviderSettings)> {
        [
            ("suggestion", &self.suggestion),
            ("answer", &self.answer),
            ("web", &self.web),
        ]
        .into_iter()
    }
}

/// Individual provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Whether the provider takes part in the cascade
    pub enabled: bool,
    /// API root, without a trailing slash
    pub base_url: String,
    /// Default model identifier
    pub model: Option<String>,
    /// Request timeout in seconds
    pub timeout: f64,
    /// Cache TTL override in seconds
    pub cache_ttl: Option<u64>,
    /// Calls allowed per 60-second window
    pub rate_limit_per_minute: u32,
    /// Global default key, used when the user has none
    pub api_key: Option<String>,
    /// Last-resort shared key
    pub shared_api_key: Option<String>,
    /// Upstream engine selector (web provider only)
    pub engine: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: String::new(),
            model: None,
            timeout: 15.0,
            cache_ttl: None,
            rate_limit_per_minute: crate::ratelimit::DEFAULT_CEILING,
            api_key: None,
            shared_api_key: None,
            engine: None,
        }
    }
}

impl ProviderSettings {
    /// Parse `base_url`, reporting a configuration error when malformed
    pub fn parsed_base_url(&self, provider: &str) -> std::result::Result<Url, SearchError> {
        Url::parse(&self.base_url).map_err(|e| {
            SearchError::Configuration(format!(
                "{} base_url {:?} is invalid: {}",
                provider, self.base_url, e
            ))
        })
    }
}

/// Per-tier limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSettings {
    /// Searches per UTC day, -1 for unlimited
    pub daily_searches: i64,
}

fn default_tier_limit(tier: Tier) -> i64 {
    match tier {
        Tier::Free => 10,
        Tier::Pro => 100,
        Tier::Enterprise => UNLIMITED,
    }
}

fn default_tiers() -> HashMap<Tier, TierSettings> {
    [Tier::Free, Tier::Pro, Tier::Enterprise]
        .into_iter()
        .map(|tier| {
            (
                tier,
                TierSettings {
                    daily_searches: default_tier_limit(tier),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8888);
        assert!(settings.search.fallback_enabled);
        assert_eq!(settings.search.max_results, 100);
        assert_eq!(settings.tier_limit(Tier::Free), 10);
        assert_eq!(settings.tier_limit(Tier::Enterprise), UNLIMITED);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = r#"
search:
  fallback_enabled: false
  max_results: 25
providers:
  answer:
    base_url: "http://localhost:9000"
    cache_ttl: 1800
    rate_limit_per_minute: 5
tiers:
  free:
    daily_searches: 3
"#;
        let settings = Settings::from_yaml(yaml).unwrap();

        assert!(!settings.search.fallback_enabled);
        assert_eq!(settings.search.max_results, 25);
        assert_eq!(settings.providers.answer.base_url, "http://localhost:9000");
        assert_eq!(settings.providers.answer.rate_limit_per_minute, 5);
        assert_eq!(settings.cache_ttl(&settings.providers.answer), 1800);
        assert_eq!(settings.cache_ttl(&settings.providers.web), 900);
        assert_eq!(settings.tier_limit(Tier::Free), 3);
        // Tiers missing from the file keep their defaults
        assert_eq!(settings.tier_limit(Tier::Pro), 100);
    }

    #[test]
    fn test_env_merge() {
        let mut settings = Settings::default();
        settings.merge_env_from(|key| match key {
            "RESEARCH_PORT" => Some("9100".to_string()),
            "RESEARCH_FALLBACK_ENABLED" => Some("false".to_string()),
            "SERPAPI_API_KEY" => Some("serp-key".to_string()),
            _ => None,
        });

        assert_eq!(settings.server.port, 9100);
        assert!(!settings.search.fallback_enabled);
        assert_eq!(settings.providers.web.api_key.as_deref(), Some("serp-key"));
    }

    #[test]
    fn test_malformed_base_url_is_configuration_error() {
        let mut settings = Settings::default();
        settings.providers.web.base_url = "not a url".to_string();

        match settings.validate() {
            Err(SearchError::Configuration(message)) => assert!(message.contains("web")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }
}
