//! # Model Providers
//!
//! The interpreter only needs one capability from a model backend: given a
//! model name, a system prompt and the conversation, return text. That is
//! [`ModelInvoker`].
//!
//! [`LlmProvider`] is the richer HTTP-facing interface implemented for
//! OpenAI-compatible and Anthropic APIs; every provider is automatically a
//! `ModelInvoker`.

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAIProvider;

use crate::error::{self, Error, ErrorKind, Result};
use crate::state::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Core Types
// ============================================================================

/// Request parameters for a completion
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub model: Option<String>,
    /// Sent out of band from the turns, the way both APIs expect it
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub stop: Option<Vec<String>>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        let system = system.into();
        self.system = if system.is_empty() { None } else { Some(system) };
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = Some(max);
        self
    }
}

/// Response from a completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub content: Option<String>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

/// Token usage information
#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Error type for provider operations
#[derive(Debug)]
pub enum ProviderError {
    /// Network/connection error
    Network(String),
    /// API returned an error
    Api { status: u16, message: String },
    /// Failed to parse response
    Parse(String),
    /// Rate limited
    RateLimited { retry_after: Option<u64> },
    /// Invalid request
    InvalidRequest(String),
    /// Model not found
    ModelNotFound(String),
    /// Authentication failed or no key configured
    AuthenticationFailed,
    /// Other error
    Other(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(e) => write!(f, "Network error: {}", e),
            Self::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            Self::Parse(e) => write!(f, "Parse error: {}", e),
            Self::RateLimited { retry_after } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after {
                    write!(f, " (retry after {}s)", secs)?;
                }
                Ok(())
            }
            Self::InvalidRequest(e) => write!(f, "Invalid request: {}", e),
            Self::ModelNotFound(m) => write!(f, "Model not found: {}", m),
            Self::AuthenticationFailed => write!(f, "Authentication failed"),
            Self::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        let message = err.to_string();
        let mapped = match &err {
            ProviderError::AuthenticationFailed => Error::config_invalid(message),
            ProviderError::ModelNotFound(model) => {
                Error::config_invalid(message).with_context("model", model.clone())
            }
            ProviderError::InvalidRequest(_) => Error::invalid_argument(message),
            ProviderError::Network(_) => error::network_failed(message),
            ProviderError::RateLimited { .. } => error::rate_limited(message),
            ProviderError::Api { status: 413, .. } => error::context_too_large(message),
            ProviderError::Api { status, .. } if *status >= 500 => {
                error::provider_unavailable(message).with_context("status", status.to_string())
            }
            ProviderError::Api { status, .. } => {
                Error::inference_failed(message)
                    .permanent()
                    .with_context("status", status.to_string())
            }
            ProviderError::Parse(_) => Error::new(ErrorKind::ParseFailed, message),
            ProviderError::Other(_) => Error::inference_failed(message),
        };
        mapped.with_operation("provider::complete").set_source(err)
    }
}

/// An HTTP-backed LLM
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "openai", "anthropic")
    fn name(&self) -> &str;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Send a completion request and get a full response
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError>;

    /// Simple prompt -> response helper
    async fn prompt(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        let request = CompletionRequest::new(vec![Message::user(prompt)]);
        let response = self.complete(request).await?;
        response.content.ok_or_else(|| ProviderError::Other("No content in response".into()))
    }
}

/// What the interpreter calls to get text from a model
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// `model` may be empty, meaning "the backend's default".
    async fn invoke(&self, model: &str, system: &str, messages: &[Message]) -> Result<String>;
}

#[async_trait]
impl<P: LlmProvider> ModelInvoker for P {
    async fn invoke(&self, model: &str, system: &str, messages: &[Message]) -> Result<String> {
        let model = if model.is_empty() { self.default_model() } else { model };
        let request = CompletionRequest::new(messages.to_vec())
            .with_model(model)
            .with_system(system);

        let response = self
            .complete(request)
            .await
            .map_err(|e| Error::from(e).with_context("provider", self.name().to_string()))?;

        tracing::debug!(
            provider = self.name(),
            model = %response.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "completion finished"
        );

        response.content.ok_or_else(|| {
            Error::inference_failed("no content in response")
                .with_operation("ModelInvoker::invoke")
                .with_context("model", model.to_string())
        })
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Configuration for creating providers
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    OpenAI,
    Anthropic,
    /// Any OpenAI-compatible server (vLLM, Ollama, llama.cpp)
    Local,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Local => "local",
        }
    }
}

impl std::str::FromStr for ProviderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "openai" => Ok(ProviderType::OpenAI),
            "anthropic" => Ok(ProviderType::Anthropic),
            "local" => Ok(ProviderType::Local),
            other => Err(Error::config_invalid(format!("unsupported provider: {}", other))
                .with_context("provider", other.to_string())),
        }
    }
}

impl ProviderConfig {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::OpenAI,
            api_key: Some(api_key.into()),
            base_url: Some("https://api.openai.com/v1".into()),
            default_model: Some("gpt-4o".into()),
            headers: HashMap::new(),
            timeout_secs: Some(120),
        }
    }

    pub fn anthropic(api_key: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("anthropic-version".into(), "2023-06-01".into());

        Self {
            provider_type: ProviderType::Anthropic,
            api_key: Some(api_key.into()),
            base_url: Some("https://api.anthropic.com/v1".into()),
            default_model: Some("claude-sonnet-4-20250514".into()),
            headers,
            timeout_secs: Some(120),
        }
    }

    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider_type: ProviderType::Local,
            api_key: None,
            base_url: Some(base_url.into()),
            default_model: Some(model.into()),
            headers: HashMap::new(),
            timeout_secs: Some(300),
        }
    }

    /// Build a config from the environment.
    ///
    /// Reads `OPENAI_API_KEY` / `ANTHROPIC_API_KEY` for the key, and
    /// `STEPCRAFT_BASE_URL` / `STEPCRAFT_MODEL` as overrides. A missing key
    /// is not an error here: the first request fails with a configuration
    /// error instead.
    pub fn from_env(provider_type: ProviderType) -> Self {
        Self::from_lookup(provider_type, |key| std::env::var(key).ok())
    }

    /// Same as [`ProviderConfig::from_env`], reading variables through `lookup`
    pub fn from_lookup<F>(provider_type: ProviderType, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key).and_then(|v| {
                let trimmed = v.trim().to_string();
                if trimmed.is_empty() { None } else { Some(trimmed) }
            })
        };

        let mut config = match provider_type {
            ProviderType::OpenAI => Self::openai(""),
            ProviderType::Anthropic => Self::anthropic(""),
            ProviderType::Local => Self::local("http://localhost:8000/v1", "default"),
        };
        config.api_key = match provider_type {
            ProviderType::Anthropic => non_empty("ANTHROPIC_API_KEY"),
            ProviderType::OpenAI | ProviderType::Local => non_empty("OPENAI_API_KEY"),
        };

        if let Some(base_url) = non_empty("STEPCRAFT_BASE_URL") {
            config.base_url = Some(base_url);
        }
        if let Some(model) = non_empty("STEPCRAFT_MODEL") {
            config.default_model = Some(model);
        }
        config
    }

    /// Whether requests can be authenticated
    pub fn has_credentials(&self) -> bool {
        self.provider_type == ProviderType::Local
            || self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Construct the provider this config describes
    pub fn build(self) -> Result<Arc<dyn ModelInvoker>> {
        Ok(match self.provider_type {
            ProviderType::OpenAI | ProviderType::Local => Arc::new(OpenAIProvider::new(self)?),
            ProviderType::Anthropic => Arc::new(AnthropicProvider::new(self)?),
        })
    }
}

pub(crate) fn http_client(config: &ProviderConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_secs.unwrap_or(120)))
        .build()
        .map_err(|e| {
            Error::config_invalid("failed to create HTTP client")
                .with_operation("provider::http_client")
                .set_source(e)
        })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new(vec![Message::user("Hello")])
            .with_model("gpt-4o")
            .with_system("")
            .with_temperature(0.7)
            .with_max_tokens(1000);

        assert_eq!(request.model, Some("gpt-4o".into()));
        assert_eq!(request.system, None);
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(1000));
    }

    #[test]
    fn test_provider_config() {
        let config = ProviderConfig::openai("sk-test");
        assert_eq!(config.provider_type, ProviderType::OpenAI);
        assert_eq!(config.default_model, Some("gpt-4o".into()));

        let config = ProviderConfig::anthropic("sk-ant-test");
        assert_eq!(config.provider_type, ProviderType::Anthropic);
        assert!(config.headers.contains_key("anthropic-version"));
    }

    #[test]
    fn test_config_from_env() {
        let config = ProviderConfig::from_lookup(
            ProviderType::Anthropic,
            env(&[("ANTHROPIC_API_KEY", "sk-ant"), ("STEPCRAFT_MODEL", "claude-haiku")]),
        );
        assert_eq!(config.api_key.as_deref(), Some("sk-ant"));
        assert_eq!(config.default_model.as_deref(), Some("claude-haiku"));
        assert!(config.has_credentials());
    }

    #[test]
    fn test_missing_key_is_deferred() {
        let config = ProviderConfig::from_lookup(ProviderType::OpenAI, env(&[("OPENAI_API_KEY", "  ")]));
        assert_eq!(config.api_key, None);
        assert!(!config.has_credentials());

        let local = ProviderConfig::from_lookup(ProviderType::Local, env(&[]));
        assert!(local.has_credentials());
        assert_eq!(local.base_url.as_deref(), Some("http://localhost:8000/v1"));
    }

    #[tokio::test]
    async fn test_missing_key_fails_on_first_invoke() {
        let config = ProviderConfig::from_lookup(ProviderType::Anthropic, env(&[]));
        let invoker = config.build().unwrap();
        let err = invoker
            .invoke("", "sys", &[Message::user("hi")])
            .await
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_provider_type_parse() {
        assert_eq!("anthropic".parse::<ProviderType>().unwrap(), ProviderType::Anthropic);
        assert!("gemini".parse::<ProviderType>().is_err());
    }

    #[test]
    fn test_provider_error_mapping() {
        assert!(Error::from(ProviderError::AuthenticationFailed).is_config());
        assert!(Error::from(ProviderError::RateLimited { retry_after: None }).is_retryable());

        let err = Error::from(ProviderError::Api { status: 503, message: "overloaded".into() });
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);

        let err = Error::from(ProviderError::Api { status: 400, message: "bad".into() });
        assert_eq!(err.kind(), ErrorKind::InferenceFailed);
        assert!(!err.is_retryable());
    }
}
