//! OpenAI-compatible provider implementation
//!
//! Works with OpenAI, Azure OpenAI, vLLM, Ollama, and other OpenAI-compatible APIs.

use super::*;
use crate::state::Role;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenAI-compatible provider
pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = http_client(&config)?;
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or("https://api.openai.com/v1")
    }

    fn build_request(&self, request: CompletionRequest) -> OpenAIRequest {
        let model = request
            .model
            .unwrap_or_else(|| self.default_model().to_string());

        // The system prompt travels as the leading message
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system {
            messages.push(OpenAIMessage {
                role: "system".into(),
                content: Some(system),
            });
        }
        messages.extend(request.messages.into_iter().map(OpenAIMessage::from));

        OpenAIRequest {
            model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: Some(false),
            stop: request.stop,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &str {
        match self.config.provider_type {
            ProviderType::Local => "local",
            _ => "openai",
        }
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or("gpt-4o")
    }

    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError> {
        if !self.config.has_credentials() {
            return Err(ProviderError::AuthenticationFailed);
        }
        let api_request = self.build_request(request);

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url()))
            .json(&api_request);

        if let Some(api_key) = &self.config.api_key {
            if !api_key.is_empty() {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }
        }

        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();

            return Err(match status {
                429 => ProviderError::RateLimited { retry_after: None },
                401 | 403 => ProviderError::AuthenticationFailed,
                404 => ProviderError::ModelNotFound(api_request.model),
                _ => ProviderError::Api { status, message: text },
            });
        }

        let api_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Other("No choices in response".into()))?;

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        };

        let usage = api_response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            content: choice.message.content,
            finish_reason,
            usage,
        })
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl From<Message> for OpenAIMessage {
    fn from(msg: Message) -> Self {
        Self {
            role: match msg.role {
                Role::System => "system".into(),
                Role::User => "user".into(),
                Role::Assistant => "assistant".into(),
            },
            content: Some(msg.content),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    id: String,
    model: String,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}
