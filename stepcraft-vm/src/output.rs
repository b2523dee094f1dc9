//! # Output Extraction
//!
//! Turns the final [`ExecutionState`] of a run into the agent's result.
//! An explicit `set_output` payload always wins; otherwise the definition's
//! [`OutputMode`] decides. Extraction never fails: a bad structured output
//! is an unsuccessful result carrying the raw text.

use crate::definition::OutputMode;
use crate::instruction::truncate;
use crate::state::ExecutionState;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Summary used when the run set its output explicitly
pub const EXPLICIT_OUTPUT_SUMMARY: &str = "Output set by agent";

/// Final result of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput<T = serde_json::Value> {
    pub success: bool,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> AgentOutput<T> {
    pub fn ok(summary: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            summary: summary.into(),
            data: Some(data),
        }
    }

    pub fn failed(summary: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success: false,
            summary: summary.into(),
            data,
        }
    }
}

impl AgentOutput<serde_json::Value> {
    /// Decode `data` into a concrete type
    pub fn decode<T: DeserializeOwned>(self) -> crate::Result<AgentOutput<T>> {
        let data = match self.data {
            Some(value) => Some(serde_json::from_value(value).map_err(|e| {
                crate::Error::serialization_failed(e.to_string())
                    .with_operation("output::decode")
                    .set_source(e)
            })?),
            None => None,
        };
        Ok(AgentOutput {
            success: self.success,
            summary: self.summary,
            data,
        })
    }

    /// Data as text, if it is a string
    pub fn text(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.as_str())
    }
}

/// Extract the result of a finished run
pub fn extract(state: &ExecutionState, mode: OutputMode, summary_chars: usize) -> AgentOutput {
    if let Some(output) = state.output() {
        return AgentOutput::ok(EXPLICIT_OUTPUT_SUMMARY, output.clone());
    }

    match mode {
        OutputMode::LastMessage => match state.last_assistant() {
            Some(text) => AgentOutput::ok(
                truncate(text, summary_chars),
                serde_json::Value::String(text.to_string()),
            ),
            None => AgentOutput::failed("No assistant message was produced", None),
        },
        OutputMode::AllMessages => {
            let messages = state.assistant_messages();
            let summary = format!("{} assistant messages", messages.len());
            let data = messages
                .into_iter()
                .map(|m| serde_json::Value::String(m.to_string()))
                .collect();
            AgentOutput::ok(summary, serde_json::Value::Array(data))
        }
        OutputMode::StructuredOutput => match state.last_assistant() {
            Some(text) => match parse_structured(text) {
                Ok(value) => AgentOutput::ok("Structured output parsed", value),
                Err(e) => {
                    tracing::warn!(error = %e, "structured output did not parse");
                    AgentOutput::failed(
                        format!("Failed to parse structured output: {}", e),
                        Some(serde_json::Value::String(text.to_string())),
                    )
                }
            },
            None => AgentOutput::failed("No assistant message was produced", None),
        },
    }
}

/// Parse JSON out of model text, tolerating markdown fences
pub fn parse_structured(content: &str) -> Result<serde_json::Value, serde_json::Error> {
    let json_str = if content.contains("```json") {
        content
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .unwrap_or(content)
    } else if content.contains("```") {
        content
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .unwrap_or(content)
    } else {
        content.trim()
    };

    serde_json::from_str(json_str)
}
