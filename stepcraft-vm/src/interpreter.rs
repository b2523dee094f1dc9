//! # Step Interpreter
//!
//! Drives a control program to completion.
//!
//! ## Execution Model
//! 1. Seed an [`ExecutionState`] with the system prompt, the instructions
//!    prompt and one composed user message
//! 2. Instantiate the definition's control program
//! 3. Resume the program with the last [`StepResult`], execute the
//!    instruction it yields, repeat until it yields nothing
//! 4. Extract the output according to the definition's output mode
//!
//! Instructions run strictly in order. The only fan-out is `GenerateN`,
//! which joins on all of its calls before the program resumes.
//!
//! Failures split in two: tool failures, access denials and unparseable
//! output are data the program can react to; model failures, configuration
//! errors and cancellation abort the run with an [`Error`].

use crate::access;
use crate::config::EngineConfig;
use crate::definition::AgentDefinition;
use crate::error::{self, Error, Result};
use crate::instruction::{truncate, ControlTool, Instruction, SET_OUTPUT_VALUE_KEY};
use crate::output::{self, AgentOutput};
use crate::program::{Outcome, ProgramArgs, StepResult};
use crate::provider::ModelInvoker;
use crate::state::{ExecutionState, Message, Role, Subtask, SubtaskStatus, ToolCallRecord};
use crate::tool::{required_str, ToolDispatcher, ToolInput, ToolResult};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Seeded user turn for a run with no context, params or prompt. Model APIs
/// reject an empty turn list.
pub const EMPTY_REQUEST: &str = "## Prompt\n(no input provided)";

/// Caller-supplied context folded into the seeded user message
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// A trimmed snippet of the surrounding conversation
    pub conversation: Vec<Message>,
    pub user_intent: Option<String>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversation(mut self, conversation: Vec<Message>) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.user_intent = Some(intent.into());
        self
    }
}

/// One executed instruction
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub step: usize,
    pub instruction: Instruction,
    /// Short description of what the instruction produced
    pub result: String,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub output: AgentOutput,
    pub state: ExecutionState,
    pub trace: Vec<TraceEntry>,
}

/// What one instruction hands back to the program
#[derive(Debug, Default)]
struct Executed {
    outcome: Option<Outcome>,
    complete: bool,
    responses: Vec<String>,
}

impl Executed {
    fn model(text: String, complete: bool) -> Self {
        Self {
            outcome: Some(Outcome::Model(text)),
            complete,
            responses: Vec::new(),
        }
    }

    fn tool(result: ToolResult) -> Self {
        Self {
            outcome: Some(Outcome::Tool(result)),
            ..Self::default()
        }
    }

    fn describe(&self) -> String {
        match &self.outcome {
            Some(Outcome::Tool(result)) => {
                let status = if result.success { "ok" } else { "failed" };
                format!("{}: {}", status, result.summary)
            }
            Some(Outcome::Model(text)) => {
                let done = if self.complete { " (complete)" } else { "" };
                format!("{}{}", truncate(text, 80), done)
            }
            None if !self.responses.is_empty() => format!("{} responses", self.responses.len()),
            None => "appended".to_string(),
        }
    }
}

/// The step interpreter.
///
/// Holds no per-run state: one interpreter can drive any number of runs,
/// concurrently or not.
#[derive(Clone)]
pub struct Interpreter {
    invoker: Arc<dyn ModelInvoker>,
    tools: Arc<dyn ToolDispatcher>,
    config: EngineConfig,
    cancel: CancellationToken,
}

impl Interpreter {
    pub fn new(invoker: Arc<dyn ModelInvoker>, tools: Arc<dyn ToolDispatcher>) -> Self {
        Self {
            invoker,
            tools,
            config: EngineConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Abort in-flight and future runs when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run an agent and return its output
    pub async fn run(
        &self,
        definition: &AgentDefinition,
        params: serde_json::Map<String, serde_json::Value>,
        prompt: Option<&str>,
        context: &RunContext,
    ) -> Result<AgentOutput> {
        self.run_with_report(definition, params, prompt, context)
            .await
            .map(|report| report.output)
    }

    /// Run an agent and keep the final state and the trace
    #[tracing::instrument(name = "run", skip_all, fields(agent = %definition.name))]
    pub async fn run_with_report(
        &self,
        definition: &AgentDefinition,
        params: serde_json::Map<String, serde_json::Value>,
        prompt: Option<&str>,
        context: &RunContext,
    ) -> Result<RunReport> {
        self.config.validate()?;

        let mut user_message = compose_user_message(context, &params, prompt);
        if user_message.is_empty() {
            user_message = EMPTY_REQUEST.to_string();
        }
        let mut state = ExecutionState::seeded(
            &definition.system_prompt,
            definition.instructions_prompt.as_deref(),
            &user_message,
        );

        let args = ProgramArgs {
            params,
            prompt: prompt.map(str::to_string),
        };
        let mut program = definition.start_program(&args);
        info!(messages = state.len(), "run started");

        let mut trace = Vec::new();
        let mut last = Executed::default();
        let mut step = 0;

        loop {
            let result = StepResult {
                state: &state,
                outcome: last.outcome.as_ref(),
                complete: last.complete,
                responses: &last.responses,
            };
            let Some(instruction) = program.resume(result) else {
                break;
            };

            if self.cancel.is_cancelled() {
                return Err(Error::cancelled("interpreter::run").with_context("step", step.to_string()));
            }

            step += 1;
            debug!(step, instruction = %instruction.describe(), "executing");
            last = self.execute(definition, &mut state, &instruction).await?;
            trace.push(TraceEntry {
                step,
                instruction,
                result: last.describe(),
            });
        }

        let output = output::extract(&state, definition.output_mode, self.config.summary_chars);
        info!(steps = step, success = output.success, "run finished");
        Ok(RunReport { output, state, trace })
    }

    async fn execute(
        &self,
        definition: &AgentDefinition,
        state: &mut ExecutionState,
        instruction: &Instruction,
    ) -> Result<Executed> {
        match instruction {
            Instruction::Step => {
                let text = self.step(definition, state).await?;
                Ok(Executed::model(text, false))
            }
            Instruction::StepAll => self.step_all(definition, state).await,
            Instruction::GenerateN { n } => self.generate_n(definition, state, *n).await,
            Instruction::StepText { text } => {
                state.push_assistant(text.clone());
                Ok(Executed::default())
            }
            Instruction::ToolCall {
                name,
                input,
                include_in_history,
            } => {
                self.tool_call(definition, state, name, input, *include_in_history)
                    .await
            }
        }
    }

    // =========================================================================
    // Model instructions
    // =========================================================================

    async fn step(&self, definition: &AgentDefinition, state: &mut ExecutionState) -> Result<String> {
        let system = self.system_prompt(definition, state);
        let turns = state.conversation();
        let text = self.invoke_model(&definition.model, &system, &turns).await?;
        state.push_assistant(text.clone());
        Ok(text)
    }

    /// Best-effort loop: the stop test is a heuristic on the response text
    async fn step_all(&self, definition: &AgentDefinition, state: &mut ExecutionState) -> Result<Executed> {
        let limit = self.config.step_all_limit;
        let mut text = String::new();
        for iteration in 1..=limit {
            text = self.step(definition, state).await?;
            if self.config.is_final_response(&text) {
                debug!(iteration, "step_all finished");
                return Ok(Executed::model(text, true));
            }
        }
        warn!(limit, "step_all reached its iteration cap");
        Ok(Executed::model(text, false))
    }

    async fn generate_n(
        &self,
        definition: &AgentDefinition,
        state: &ExecutionState,
        n: usize,
    ) -> Result<Executed> {
        if n > self.config.max_generate_n {
            return Err(error::generate_n_too_large(n, self.config.max_generate_n)
                .with_operation("interpreter::generate_n"));
        }

        let system = self.system_prompt(definition, state);
        let turns = state.conversation();
        let calls = (0..n).map(|_| self.invoke_model(&definition.model, &system, &turns));
        let responses = futures_util::future::try_join_all(calls).await?;
        debug!(n, "generate_n joined");

        Ok(Executed {
            responses,
            ..Executed::default()
        })
    }

    /// All system messages in order, then the step prompt as a reminder block
    fn system_prompt(&self, definition: &AgentDefinition, state: &ExecutionState) -> String {
        let mut system = state
            .system_messages()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        if let Some(reminder) = definition.step_prompt.as_deref().filter(|s| !s.trim().is_empty()) {
            if !system.is_empty() {
                system.push_str("\n\n");
            }
            let tag = &self.config.reminder_tag;
            system.push_str(&format!("<{}>\n{}\n</{}>", tag, reminder, tag));
        }
        system
    }

    async fn invoke_model(&self, model: &str, system: &str, messages: &[Message]) -> Result<String> {
        let call = async {
            match self.config.call_timeout() {
                Some(limit) => match tokio::time::timeout(limit, self.invoker.invoke(model, system, messages)).await {
                    Ok(result) => result,
                    Err(_) => Err(error::model_timeout(model, limit.as_secs())),
                },
                None => self.invoker.invoke(model, system, messages).await,
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::cancelled("interpreter::invoke_model")),
            result = call => result.map_err(|e| e.with_operation("interpreter::invoke_model")),
        }
    }

    // =========================================================================
    // Tool instructions
    // =========================================================================

    async fn tool_call(
        &self,
        definition: &AgentDefinition,
        state: &mut ExecutionState,
        name: &str,
        input: &ToolInput,
        include_in_history: bool,
    ) -> Result<Executed> {
        if let Some(control) = ControlTool::from_name(name) {
            let result = apply_control_tool(control, state, input);
            debug!(tool = name, success = result.success, "control tool applied");
            return Ok(Executed::tool(result));
        }

        let result = if access::is_tool_allowed(definition.tool_names.as_deref(), name) {
            self.dispatch(name, input).await?
        } else {
            warn!(tool = name, "tool call denied");
            ToolResult::access_denied(name)
        };

        if include_in_history {
            state.push_user(result.to_history_text(name));
        }
        state.record_tool_call(ToolCallRecord {
            name: name.to_string(),
            input: input.clone(),
            result: result.clone(),
        });
        Ok(Executed::tool(result))
    }

    async fn dispatch(&self, name: &str, input: &ToolInput) -> Result<ToolResult> {
        let call = async {
            match self.config.call_timeout() {
                Some(limit) => match tokio::time::timeout(limit, self.tools.execute(name, input)).await {
                    Ok(result) => result,
                    Err(_) => {
                        let err = Error::tool_timeout(name, limit.as_secs());
                        warn!(tool = name, "{}", err.message());
                        ToolResult::failed(err.message())
                    }
                },
                None => self.tools.execute(name, input).await,
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::cancelled("interpreter::dispatch").with_context("tool", name)),
            result = call => Ok(result),
        }
    }
}

// =============================================================================
// Control tools
// =============================================================================

fn apply_control_tool(control: ControlTool, state: &mut ExecutionState, input: &ToolInput) -> ToolResult {
    let applied = match control {
        ControlTool::SetOutput => set_output(state, input),
        ControlTool::AddMessage => add_message(state, input),
        ControlTool::AddSubgoal => add_subgoal(state, input),
        ControlTool::UpdateSubgoal => update_subgoal(state, input),
    };
    applied.unwrap_or_else(|failure| failure)
}

fn set_output(state: &mut ExecutionState, input: &ToolInput) -> std::result::Result<ToolResult, ToolResult> {
    let payload = match input.get(SET_OUTPUT_VALUE_KEY) {
        Some(value) if input.len() == 1 => value.clone(),
        _ => serde_json::Value::Object(input.clone()),
    };
    let rendered = payload.to_string();
    state.set_output(payload);
    Ok(ToolResult::ok("Output set", rendered))
}

fn add_message(state: &mut ExecutionState, input: &ToolInput) -> std::result::Result<ToolResult, ToolResult> {
    let role: Role = input
        .get("role")
        .and_then(|v| v.as_str())
        .unwrap_or("user")
        .parse::<Role>()
        .map_err(ToolResult::failed)?;
    let content = required_str(input, "content")?;

    state
        .append(Message::new(role, content))
        .map_err(ToolResult::failed)?;
    Ok(ToolResult::ok(format!("Added {} message", role), ""))
}

fn add_subgoal(state: &mut ExecutionState, input: &ToolInput) -> std::result::Result<ToolResult, ToolResult> {
    let id = required_str(input, "id")?;
    let objective = required_str(input, "objective")?;

    let mut subtask = Subtask::new(id, objective);
    subtask.status = optional_status(input)?.unwrap_or_default();
    subtask.plan = optional_string(input, "plan");

    if !state.add_subtask(subtask) {
        return Err(ToolResult::failed(format!("Subgoal already exists: {}", id)));
    }
    Ok(ToolResult::ok(format!("Added subgoal {}", id), objective))
}

fn update_subgoal(state: &mut ExecutionState, input: &ToolInput) -> std::result::Result<ToolResult, ToolResult> {
    let id = required_str(input, "id")?;
    let status = optional_status(input)?;
    let plan = optional_string(input, "plan");
    let log = optional_string(input, "log").unwrap_or_else(|| match status {
        Some(status) => format!("status -> {}", status),
        None => "updated".to_string(),
    });

    let subtask = state.update_subtask(id, status, plan, log);
    Ok(ToolResult::ok(
        format!("Updated subgoal {} ({})", subtask.id, subtask.status),
        subtask.objective.clone(),
    ))
}

fn optional_status(input: &ToolInput) -> std::result::Result<Option<SubtaskStatus>, ToolResult> {
    match input.get("status").and_then(|v| v.as_str()) {
        Some(raw) => raw.parse::<SubtaskStatus>().map(Some).map_err(ToolResult::failed),
        None => Ok(None),
    }
}

fn optional_string(input: &ToolInput, key: &str) -> Option<String> {
    input.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

// =============================================================================
// Seeding
// =============================================================================

/// Build the seeded user message from labeled sections. Empty sections are
/// left out.
pub fn compose_user_message(
    context: &RunContext,
    params: &serde_json::Map<String, serde_json::Value>,
    prompt: Option<&str>,
) -> String {
    let mut sections = Vec::new();

    if !context.conversation.is_empty() {
        let lines = context
            .conversation
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("## Conversation\n{}", lines));
    }
    if let Some(intent) = context.user_intent.as_deref().filter(|s| !s.trim().is_empty()) {
        sections.push(format!("## User Intent\n{}", intent));
    }
    if !params.is_empty() {
        let rendered = serde_json::to_string_pretty(params).unwrap_or_default();
        sections.push(format!("## Parameters\n{}", rendered));
    }
    if let Some(prompt) = prompt.filter(|s| !s.trim().is_empty()) {
        sections.push(format!("## Prompt\n{}", prompt));
    }

    sections.join("\n\n")
}
