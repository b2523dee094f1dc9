//! # Execution State
//!
//! The mutable record threaded through one run: the message log, the history
//! of tool calls, sub-task bookkeeping and the optional explicit output.
//!
//! A state is created fresh for every run and owned by exactly one
//! interpreter invocation. System-role messages are only written while
//! seeding; afterwards the log grows with user and assistant turns only.

use crate::tool::ToolResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Role of a message in the conversation log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// A role-tagged entry in the message log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Status of a sub-task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl SubtaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubtaskStatus::Pending => "pending",
            SubtaskStatus::InProgress => "in_progress",
            SubtaskStatus::Completed => "completed",
            SubtaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubtaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubtaskStatus::Pending),
            "in_progress" => Ok(SubtaskStatus::InProgress),
            "completed" => Ok(SubtaskStatus::Completed),
            "blocked" => Ok(SubtaskStatus::Blocked),
            other => Err(format!("unknown subgoal status '{}'", other)),
        }
    }
}

/// Bookkeeping record for a unit of work. Never read by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    pub objective: String,
    pub status: SubtaskStatus,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl Subtask {
    pub fn new(id: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            objective: objective.into(),
            status: SubtaskStatus::Pending,
            plan: None,
            logs: Vec::new(),
        }
    }
}

/// One tool call the run attempted, with the outcome it got back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub input: serde_json::Map<String, serde_json::Value>,
    pub result: ToolResult,
}

/// The state of one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionState {
    messages: Vec<Message>,
    tool_calls: Vec<ToolCallRecord>,
    subtasks: BTreeMap<String, Subtask>,
    output: Option<serde_json::Value>,
}

impl ExecutionState {
    /// Seed a state in the fixed order: system prompt, instructions prompt,
    /// then the composed user message. Empty fragments are skipped.
    pub fn seeded(system_prompt: &str, instructions_prompt: Option<&str>, user_message: &str) -> Self {
        let mut messages = Vec::with_capacity(3);
        if !system_prompt.trim().is_empty() {
            messages.push(Message::system(system_prompt));
        }
        if let Some(instructions) = instructions_prompt.filter(|s| !s.trim().is_empty()) {
            messages.push(Message::system(instructions));
        }
        if !user_message.trim().is_empty() {
            messages.push(Message::user(user_message));
        }

        Self {
            messages,
            ..Default::default()
        }
    }

    // =========================================================================
    // Message log
    // =========================================================================

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// System-role messages in insertion order
    pub fn system_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.role == Role::System)
    }

    /// Everything except system messages, in order - the turns a model sees
    pub fn conversation(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Append a message on behalf of a control program.
    ///
    /// System messages are rejected: the system block is frozen once seeded.
    pub fn append(&mut self, message: Message) -> Result<(), String> {
        if message.role == Role::System {
            return Err("system messages cannot be appended after seeding".to_string());
        }
        self.messages.push(message);
        Ok(())
    }

    pub fn last_assistant(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    pub fn assistant_messages(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
            .collect()
    }

    // =========================================================================
    // Tool calls
    // =========================================================================

    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    pub fn record_tool_call(&mut self, record: ToolCallRecord) {
        self.tool_calls.push(record);
    }

    // =========================================================================
    // Sub-tasks
    // =========================================================================

    pub fn subtasks(&self) -> &BTreeMap<String, Subtask> {
        &self.subtasks
    }

    pub fn subtask(&self, id: &str) -> Option<&Subtask> {
        self.subtasks.get(id)
    }

    /// Insert a new sub-task. Returns false and leaves the map untouched
    /// when the id is already taken.
    pub fn add_subtask(&mut self, subtask: Subtask) -> bool {
        if self.subtasks.contains_key(&subtask.id) {
            return false;
        }
        self.subtasks.insert(subtask.id.clone(), subtask);
        true
    }

    /// Update a sub-task, creating it (objective = id) when missing.
    pub fn update_subtask(
        &mut self,
        id: &str,
        status: Option<SubtaskStatus>,
        plan: Option<String>,
        log: String,
    ) -> &Subtask {
        let subtask = self
            .subtasks
            .entry(id.to_string())
            .or_insert_with(|| Subtask::new(id, id));
        if let Some(status) = status {
            subtask.status = status;
        }
        if plan.is_some() {
            subtask.plan = plan;
        }
        subtask.logs.push(log);
        subtask
    }

    // =========================================================================
    // Explicit output
    // =========================================================================

    pub fn output(&self) -> Option<&serde_json::Value> {
        self.output.as_ref()
    }

    pub fn set_output(&mut self, value: serde_json::Value) {
        self.output = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeding_order_and_skips() {
        let state = ExecutionState::seeded("You are terse.", Some("Answer in JSON."), "## Prompt\nhi");
        let roles: Vec<Role> = state.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::System, Role::User]);
        assert_eq!(state.messages()[1].content, "Answer in JSON.");

        let state = ExecutionState::seeded("sys", Some("   "), "");
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_append_rejects_system() {
        let mut state = ExecutionState::seeded("sys", None, "go");
        assert!(state.append(Message::system("sneaky")).is_err());
        assert!(state.append(Message::assistant("fine")).is_ok());
        assert_eq!(state.system_messages().count(), 1);
        assert_eq!(state.last_assistant(), Some("fine"));
    }

    #[test]
    fn test_conversation_excludes_system() {
        let mut state = ExecutionState::seeded("sys", Some("inst"), "question");
        state.push_assistant("answer");
        let turns = state.conversation();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], Message::user("question"));
        assert_eq!(turns[1], Message::assistant("answer"));
    }

    #[test]
    fn test_add_subtask_refuses_duplicates() {
        let mut state = ExecutionState::default();
        assert!(state.add_subtask(Subtask::new("t1", "write tests")));
        assert!(!state.add_subtask(Subtask::new("t1", "something else")));
        assert_eq!(state.subtask("t1").map(|s| s.objective.as_str()), Some("write tests"));
    }

    #[test]
    fn test_update_subtask_creates_on_demand() {
        let mut state = ExecutionState::default();
        let task = state.update_subtask(
            "refactor-parser",
            Some(SubtaskStatus::InProgress),
            Some("split lexer".to_string()),
            "started".to_string(),
        );
        assert_eq!(task.objective, "refactor-parser");
        assert_eq!(task.status, SubtaskStatus::InProgress);
        assert_eq!(task.logs, vec!["started".to_string()]);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("in_progress".parse::<SubtaskStatus>(), Ok(SubtaskStatus::InProgress));
        assert!("done".parse::<SubtaskStatus>().is_err());
        assert_eq!("assistant".parse::<Role>(), Ok(Role::Assistant));
    }
}
