//! # Tool Dispatch
//!
//! The engine talks to tools through [`ToolDispatcher`]: a name, an input
//! map, and a uniform [`ToolResult`] back. The dispatcher enforces nothing;
//! access control happens in the interpreter before a call gets here.
//!
//! [`ToolRegistry`] is the stock dispatcher: a [`Registry`] of [`Tool`]s.

use crate::registry::{Named, Registry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Input passed to a tool
pub type ToolInput = serde_json::Map<String, serde_json::Value>;

/// Uniform outcome of a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    /// One-line description of what happened
    pub summary: String,
    /// Full textual output
    pub full_result: String,
}

impl ToolResult {
    pub fn ok(summary: impl Into<String>, full_result: impl Into<String>) -> Self {
        Self {
            success: true,
            summary: summary.into(),
            full_result: full_result.into(),
        }
    }

    pub fn failed(summary: impl Into<String>) -> Self {
        let summary = summary.into();
        Self {
            success: false,
            full_result: summary.clone(),
            summary,
        }
    }

    pub fn access_denied(name: &str) -> Self {
        Self::failed(format!("Access denied: {}", name))
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::failed(format!("Unknown tool: {}", name))
    }

    /// Render the result the way it is shown to the model
    pub fn to_history_text(&self, name: &str) -> String {
        let status = if self.success { "ok" } else { "failed" };
        if self.full_result.is_empty() || self.full_result == self.summary {
            format!("[tool {}] {}: {}", name, status, self.summary)
        } else {
            format!(
                "[tool {}] {}: {}\n\n{}",
                name, status, self.summary, self.full_result
            )
        }
    }
}

/// Executes side-effecting operations by name
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn execute(&self, name: &str, input: &ToolInput) -> ToolResult;
}

#[async_trait]
impl<D: ToolDispatcher + ?Sized> ToolDispatcher for Arc<D> {
    async fn execute(&self, name: &str, input: &ToolInput) -> ToolResult {
        (**self).execute(name, input).await
    }
}

/// A single tool that can be registered in a [`ToolRegistry`]
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn call(&self, input: &ToolInput) -> ToolResult;
}

impl Named for dyn Tool {
    fn name(&self) -> &str {
        Tool::name(self)
    }
}

/// Dispatcher backed by a registry of tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Registry<dyn Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> crate::Result<()> {
        self.tools.register(tool)
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> crate::Result<Self> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.names()
    }

    /// (name, description) pairs for every registered tool
    pub fn describe(&self) -> Vec<(String, String)> {
        self.tools
            .iter()
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect()
    }
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    async fn execute(&self, name: &str, input: &ToolInput) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.call(input).await,
            None => ToolResult::unknown_tool(name),
        }
    }
}

/// Fetch a required string field from tool input
pub fn required_str<'a>(input: &'a ToolInput, key: &str) -> Result<&'a str, ToolResult> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolResult::failed(format!("missing required string field '{}'", key)))
}
