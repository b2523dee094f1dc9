//! Engine tuning knobs

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits and heuristics the interpreter runs with.
///
/// Every field has a default, so a partial JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Safety bound on model calls inside one `StepAll`
    pub step_all_limit: usize,
    /// Responses shorter than this (in chars) end a `StepAll`
    pub short_response_chars: usize,
    /// A `StepAll` keeps going only while responses contain this marker
    pub continue_sentinel: String,
    /// Largest `n` a `GenerateN` may ask for
    pub max_generate_n: usize,
    /// Deadline for a single model or tool call; `None` waits forever
    pub call_timeout_secs: Option<u64>,
    /// Length of the summary derived from a final message
    pub summary_chars: usize,
    /// Tag wrapping the step prompt in the system prompt
    pub reminder_tag: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_all_limit: 10,
            short_response_chars: 100,
            continue_sentinel: "<tool_call>".to_string(),
            max_generate_n: 16,
            call_timeout_secs: Some(300),
            summary_chars: 200,
            reminder_tag: "system-reminder".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }

    pub fn with_step_all_limit(mut self, limit: usize) -> Self {
        self.step_all_limit = limit;
        self
    }

    pub fn with_max_generate_n(mut self, max: usize) -> Self {
        self.max_generate_n = max;
        self
    }

    pub fn with_call_timeout(mut self, secs: Option<u64>) -> Self {
        self.call_timeout_secs = secs;
        self
    }

    /// Reject configurations the interpreter cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.step_all_limit == 0 {
            return Err(crate::Error::config_invalid("step_all_limit must be at least 1")
                .with_operation("EngineConfig::validate"));
        }
        if self.max_generate_n == 0 {
            return Err(crate::Error::config_invalid("max_generate_n must be at least 1")
                .with_operation("EngineConfig::validate"));
        }
        if self.call_timeout_secs == Some(0) {
            return Err(crate::Error::config_invalid("call_timeout_secs must be positive")
                .with_operation("EngineConfig::validate"));
        }
        Ok(())
    }

    /// Whether a `StepAll` should stop after this response
    pub fn is_final_response(&self, response: &str) -> bool {
        response.chars().count() < self.short_response_chars
            || !response.contains(&self.continue_sentinel)
    }
}
