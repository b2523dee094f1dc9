//! # Stepcraft VM
//!
//! A step-execution engine for agents written as declarative control
//! programs.
//!
//! ## Core Concepts
//! - **Instructions**: the five things a program can ask for (tool call,
//!   canned text, fan-out generation, one step, step until done)
//! - **Control programs**: resumable instruction sources fed a [`StepResult`]
//!   after every instruction
//! - **Execution state**: the message log, tool-call history, sub-tasks and
//!   explicit output of one run
//! - **Interpreter**: seeds the state, drives the program, dispatches tools
//!   with per-agent access control, and extracts the output
//! - **Providers**: model backends behind the [`ModelInvoker`] seam

pub mod access;
pub mod config;
pub mod definition;
pub mod error;
pub mod instruction;
pub mod interpreter;
pub mod output;
pub mod program;
pub mod provider;
pub mod registry;
pub mod state;
pub mod tool;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use access::is_tool_allowed;
pub use config::EngineConfig;
pub use definition::{AgentDefinition, OutputMode, ProgramFactory, ProgramSource};
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use instruction::{ControlTool, Instruction, SET_OUTPUT_VALUE_KEY};
pub use interpreter::{compose_user_message, EMPTY_REQUEST, Interpreter, RunContext, RunReport, TraceEntry};
pub use output::{parse_structured, AgentOutput};
pub use program::{ControlProgram, Outcome, Program, ProgramArgs, ScriptCursor, StateMachine, StepResult};
pub use provider::{
    AnthropicProvider, CompletionRequest, CompletionResponse, LlmProvider, ModelInvoker,
    OpenAIProvider, ProviderConfig, ProviderError, ProviderType,
};
pub use registry::{Named, Registry};
pub use state::{ExecutionState, Message, Role, Subtask, SubtaskStatus, ToolCallRecord};
pub use tool::{Tool, ToolDispatcher, ToolInput, ToolRegistry, ToolResult};

pub use tokio_util::sync::CancellationToken;
