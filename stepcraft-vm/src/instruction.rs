//! # Instructions
//!
//! The fixed instruction set a control program speaks. There are exactly
//! five shapes; the interpreter matches them exhaustively.
//!
//! ## Wire format
//! Instructions serialize with an `op` tag so scripted agents can be written
//! as JSON:
//!
//! ```json
//! [
//!   {"op": "TOOL_CALL", "name": "read_file", "input": {"path": "README.md"}},
//!   {"op": "STEP"}
//! ]
//! ```

use crate::tool::ToolInput;
use serde::{Deserialize, Serialize};

/// One step of a control program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Instruction {
    /// Dispatch a tool (or an engine control tool)
    ToolCall {
        /// Tool name
        name: String,
        /// Tool input
        #[serde(default)]
        input: ToolInput,
        /// Append the tool's output to the message log
        #[serde(default = "default_true")]
        include_in_history: bool,
    },

    /// Append literal text as an assistant message, no model call
    StepText {
        text: String,
    },

    /// Run `n` model calls concurrently against the same state.
    /// Responses land in the step result, never in the log.
    GenerateN {
        n: usize,
    },

    /// Exactly one model call, appended as an assistant message
    Step,

    /// Repeated model calls until the stop heuristic fires or the safety
    /// bound is reached
    StepAll,
}

fn default_true() -> bool {
    true
}

/// Reserved `set_output` input key carrying a non-object payload. An input
/// whose only key is this one stores the inner value as the output.
pub const SET_OUTPUT_VALUE_KEY: &str = "$output";

/// Tool names the interpreter handles itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTool {
    SetOutput,
    AddMessage,
    AddSubgoal,
    UpdateSubgoal,
}

impl ControlTool {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "set_output" => Some(ControlTool::SetOutput),
            "add_message" => Some(ControlTool::AddMessage),
            "add_subgoal" => Some(ControlTool::AddSubgoal),
            "update_subgoal" => Some(ControlTool::UpdateSubgoal),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControlTool::SetOutput => "set_output",
            ControlTool::AddMessage => "add_message",
            ControlTool::AddSubgoal => "add_subgoal",
            ControlTool::UpdateSubgoal => "update_subgoal",
        }
    }
}

impl Instruction {
    /// `ToolCall` whose output is appended to the history
    pub fn tool(name: impl Into<String>, input: serde_json::Value) -> Self {
        Instruction::ToolCall {
            name: name.into(),
            input: into_input(input),
            include_in_history: true,
        }
    }

    /// `ToolCall` whose output stays out of the history
    pub fn quiet_tool(name: impl Into<String>, input: serde_json::Value) -> Self {
        Instruction::ToolCall {
            name: name.into(),
            input: into_input(input),
            include_in_history: false,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Instruction::StepText { text: text.into() }
    }

    /// `ToolCall(set_output, payload)`. Objects travel as the input itself;
    /// anything else rides under [`SET_OUTPUT_VALUE_KEY`].
    pub fn set_output(payload: serde_json::Value) -> Self {
        let input = match payload {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = ToolInput::new();
                map.insert(SET_OUTPUT_VALUE_KEY.to_string(), other);
                map
            }
        };
        Instruction::ToolCall {
            name: ControlTool::SetOutput.name().to_string(),
            input,
            include_in_history: true,
        }
    }

    /// `ToolCall(add_message, {role, content})`
    pub fn add_message(role: crate::Role, content: impl Into<String>) -> Self {
        Instruction::tool(
            ControlTool::AddMessage.name(),
            serde_json::json!({ "role": role.as_str(), "content": content.into() }),
        )
    }

    /// Check if this instruction calls the model
    pub fn is_model_call(&self) -> bool {
        matches!(
            self,
            Instruction::Step | Instruction::StepAll | Instruction::GenerateN { .. }
        )
    }

    /// The control tool this instruction targets, if any
    pub fn control_tool(&self) -> Option<ControlTool> {
        match self {
            Instruction::ToolCall { name, .. } => ControlTool::from_name(name),
            _ => None,
        }
    }

    /// Short human-readable form used in traces and listings
    pub fn describe(&self) -> String {
        let (name, details) = self.format_parts();
        if details.is_empty() {
            name.to_string()
        } else {
            format!("{} {}", name, details)
        }
    }

    fn format_parts(&self) -> (&'static str, String) {
        match self {
            Instruction::ToolCall {
                name,
                input,
                include_in_history,
            } => {
                let quiet = if *include_in_history { "" } else { " (quiet)" };
                (
                    "TOOL_CALL",
                    format!("{}({}){}", name, format_input_brief(input), quiet),
                )
            }
            Instruction::StepText { text } => ("STEP_TEXT", format!("\"{}\"", truncate(text, 30))),
            Instruction::GenerateN { n } => ("GENERATE_N", n.to_string()),
            Instruction::Step => ("STEP", String::new()),
            Instruction::StepAll => ("STEP_ALL", String::new()),
        }
    }
}

/// Payloads that aren't objects get wrapped as `{"value": ...}`
pub(crate) fn into_input(value: serde_json::Value) -> ToolInput {
    match value {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => ToolInput::new(),
        other => {
            let mut map = ToolInput::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Char-boundary-safe truncation with an ellipsis
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

fn format_value_brief(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => format!("\"{}\"", truncate(s, 20)),
        serde_json::Value::Array(a) => format!("[{} items]", a.len()),
        serde_json::Value::Object(o) => format!("{{{} keys}}", o.len()),
        other => other.to_string(),
    }
}

fn format_input_brief(input: &ToolInput) -> String {
    if input.len() <= 2 {
        input
            .iter()
            .map(|(k, v)| format!("{}={}", k, format_value_brief(v)))
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        format!("{} args", input.len())
    }
}
