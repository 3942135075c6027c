//! Per-user provider credentials

use super::ProviderKind;
use crate::config::{ProviderSettings, ProvidersSettings};
use serde::{Deserialize, Serialize};

/// Optional API key for each provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub openai: Option<String>,
    pub perplexity: Option<String>,
    pub serpapi: Option<String>,
}

impl ProviderCredentials {
    pub fn get(&self, kind: ProviderKind) -> Option<&str> {
        let key = match kind {
            ProviderKind::Suggestion => &self.openai,
            ProviderKind::Answer => &self.perplexity,
            ProviderKind::Web => &self.serpapi,
        };
        key.as_deref()
    }

    pub fn with(mut self, kind: ProviderKind, key: impl Into<String>) -> Self {
        let slot = match kind {
            ProviderKind::Suggestion => &mut self.openai,
            ProviderKind::Answer => &mut self.perplexity,
            ProviderKind::Web => &mut self.serpapi,
        };
        *slot = Some(key.into());
        self
    }

    /// Fill each slot from the user's key, then the global default, then
    /// the shared key. Blank keys count as missing.
    pub fn resolve(user: &ProviderCredentials, settings: &ProvidersSettings) -> Self {
        Self {
            openai: pick(user.openai.as_deref(), &settings.suggestion),
            perplexity: pick(user.perplexity.as_deref(), &settings.answer),
            serpapi: pick(user.serpapi.as_deref(), &settings.web),
        }
    }
}

fn pick(user: Option<&str>, settings: &ProviderSettings) -> Option<String> {
    [
        user,
        settings.api_key.as_deref(),
        settings.shared_api_key.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|key| !key.is_empty())
    .map(str::to_string)
}
