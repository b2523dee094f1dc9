//! Anthropic Claude provider implementation

use super::*;
use crate::state::Role;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = http_client(&config)?;
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or("https://api.anthropic.com/v1")
    }

    fn build_request(&self, request: CompletionRequest) -> AnthropicRequest {
        let model = request
            .model
            .unwrap_or_else(|| self.default_model().to_string());

        AnthropicRequest {
            model,
            messages: merge_turns(request.messages),
            system: request.system,
            max_tokens: request.max_tokens.unwrap_or(4096),
            temperature: request.temperature,
            stream: Some(false),
            stop_sequences: request.stop,
        }
    }
}

/// The Messages API wants strictly alternating turns; consecutive messages
/// of the same role are joined.
fn merge_turns(messages: Vec<Message>) -> Vec<AnthropicMessage> {
    let mut merged: Vec<AnthropicMessage> = Vec::with_capacity(messages.len());
    for msg in messages {
        let role = match msg.role {
            Role::Assistant => "assistant",
            Role::User | Role::System => "user",
        };
        match merged.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(&msg.content);
            }
            _ => merged.push(AnthropicMessage {
                role: role.into(),
                content: msg.content,
            }),
        }
    }
    merged
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or("claude-sonnet-4-20250514")
    }

    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError> {
        let api_request = self.build_request(request);

        let api_key = match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ => return Err(ProviderError::AuthenticationFailed),
        };

        let mut req = self
            .client
            .post(format!("{}/messages", self.base_url()))
            .header("x-api-key", api_key)
            .header("content-type", "application/json")
            .json(&api_request);

        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }
        if !self.config.headers.contains_key("anthropic-version") {
            req = req.header("anthropic-version", "2023-06-01");
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

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(api_response.into())
    }
}

impl From<AnthropicResponse> for CompletionResponse {
    fn from(api_response: AnthropicResponse) -> Self {
        let content: String = api_response
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect();

        let finish_reason = match api_response.stop_reason.as_deref() {
            Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
            Some("max_tokens") => FinishReason::Length,
            _ => FinishReason::Unknown,
        };

        CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            content: if content.is_empty() { None } else { Some(content) },
            finish_reason,
            usage: Usage {
                prompt_tokens: api_response.usage.input_tokens,
                completion_tokens: api_response.usage.output_tokens,
                total_tokens: api_response.usage.input_tokens + api_response.usage.output_tokens,
            },
        }
    }
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consecutive_turns_are_merged() {
        let merged = merge_turns(vec![
            Message::user("task"),
            Message::user("[tool search] ok: 2 results"),
            Message::assistant("done"),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].role, "user");
        assert_eq!(merged[0].content, "task\n\n[tool search] ok: 2 results");
        assert_eq!(merged[1].role, "assistant");
    }

    #[test]
    fn test_system_is_out_of_band() {
        let provider = AnthropicProvider::new(ProviderConfig::anthropic("sk-ant")).unwrap();
        let api = provider.build_request(
            CompletionRequest::new(vec![Message::user("hi")]).with_system("rules"),
        );
        assert_eq!(api.system.as_deref(), Some("rules"));
        assert_eq!(api.messages.len(), 1);
        assert_eq!(api.max_tokens, 4096);
    }

    #[test]
    fn test_response_text_blocks_are_joined() {
        let raw = r#"{
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": "world"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5, "output_tokens": 2}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(raw).unwrap();
        let response = CompletionResponse::from(parsed);
        assert_eq!(response.content.as_deref(), Some("Hello world"));
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.usage.total_tokens, 7);
    }
}
