//! Provider configuration and per-provider defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Known provider families. `Custom` covers any OpenAI-compatible
/// endpoint the user points the bridge at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    OpenRouter,
    Local,
    Custom,
}

impl Provider {
    /// Default chat-completions endpoint for the provider.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com/v1",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::Local => "http://localhost:11434/v1",
            Provider::Custom => "",
        }
    }

    /// Default model when a profile does not pin one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o",
            Provider::Anthropic => "claude-sonnet-4-20250514",
            Provider::OpenRouter => "openai/gpt-4o",
            Provider::Local => "llama3.1",
            Provider::Custom => "",
        }
    }
}

/// Configuration for one provider connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: Provider,

    /// Bearer credential.
    pub api_key: String,

    /// Base URL; `{endpoint}/chat/completions` is the request target.
    pub endpoint: String,

    pub model: String,

    /// Request deadline. The pipeline's lease timeouts assume this stays
    /// at or below 45 seconds.
    #[serde(default = "default_timeout")]
    pub timeout: Duration,

    /// Maximum retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl ProviderConfig {
    /// Create a configuration from provider defaults.
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            endpoint: provider.default_endpoint().to_string(),
            model: provider.default_model().to_string(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(45)
}

fn default_max_retries() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_per_provider() {
        let config = ProviderConfig::new(Provider::OpenAi, "key");
        assert_eq!(config.endpoint, "https://api.openai.com/v1");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_builder_overrides() {
        let config = ProviderConfig::new(Provider::Custom, "key")
            .with_endpoint("http://localhost:8080/v1")
            .with_model("my-model")
            .with_timeout(Duration::from_secs(30));
        assert_eq!(config.endpoint, "http://localhost:8080/v1");
        assert_eq!(config.model, "my-model");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
