//! # Control Programs
//!
//! A control program is a resumable sequence of [`Instruction`]s. The
//! interpreter suspends it at every instruction boundary and resumes it with
//! the [`StepResult`] of the instruction it just ran:
//!
//! ```text
//! resume(initial) -> Some(i1)   interpreter runs i1
//! resume(r1)      -> Some(i2)   interpreter runs i2
//! resume(r2)      -> None       done, extract output
//! ```
//!
//! Two implementations ship with the engine:
//! - [`Program`]: a named instruction list, loadable from JSON, run in order
//! - [`StateMachine`]: an explicit state value plus a transition function

use crate::instruction::Instruction;
use crate::state::ExecutionState;
use crate::tool::ToolResult;
use serde::{Deserialize, Serialize};

/// Raw outcome of the last instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A tool (or control tool) ran
    Tool(ToolResult),
    /// The model produced text (the last one, for `StepAll`)
    Model(String),
}

impl Outcome {
    pub fn as_tool(&self) -> Option<&ToolResult> {
        match self {
            Outcome::Tool(result) => Some(result),
            Outcome::Model(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Outcome::Model(text) => Some(text),
            Outcome::Tool(_) => None,
        }
    }
}

/// What the interpreter hands back to the program after each instruction
#[derive(Debug, Clone, Copy)]
pub struct StepResult<'a> {
    /// The run's state after the instruction
    pub state: &'a ExecutionState,
    /// Raw tool/model outcome, if the instruction produced one
    pub outcome: Option<&'a Outcome>,
    /// Set when a `StepAll` ended because the model signalled it was done
    pub complete: bool,
    /// The n responses of a `GenerateN`, empty otherwise
    pub responses: &'a [String],
}

impl<'a> StepResult<'a> {
    /// The result a program sees before its first instruction
    pub fn initial(state: &'a ExecutionState) -> Self {
        Self {
            state,
            outcome: None,
            complete: false,
            responses: &[],
        }
    }

    pub fn tool_result(&self) -> Option<&'a ToolResult> {
        self.outcome.and_then(Outcome::as_tool)
    }

    pub fn text(&self) -> Option<&'a str> {
        self.outcome.and_then(Outcome::as_text)
    }
}

/// A resumable instruction source
pub trait ControlProgram: Send {
    /// Feed the last step result in, get the next instruction out.
    /// `None` ends the run.
    fn resume(&mut self, last: StepResult<'_>) -> Option<Instruction>;
}

impl<P: ControlProgram + ?Sized> ControlProgram for Box<P> {
    fn resume(&mut self, last: StepResult<'_>) -> Option<Instruction> {
        (**self).resume(last)
    }
}

/// Values available to a program when it is instantiated for a run
#[derive(Debug, Clone, Default)]
pub struct ProgramArgs {
    pub params: serde_json::Map<String, serde_json::Value>,
    pub prompt: Option<String>,
}

// =============================================================================
// Scripted programs
// =============================================================================

/// A program is a sequence of instructions with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Unique program identifier
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// The instructions, executed in order
    pub code: Vec<Instruction>,
}

impl Program {
    pub fn new(id: impl Into<String>, name: impl Into<String>, code: Vec<Instruction>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            code,
        }
    }

    /// The program used when an agent declares none: keep stepping until
    /// the model is done
    pub fn default_steps() -> Self {
        Self::new("default", "Step until done", vec![Instruction::StepAll])
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Instantiate a fresh cursor over this program, with `{{prompt}}` and
    /// `{{params.<key>}}` placeholders substituted
    pub fn start(&self, args: &ProgramArgs) -> ScriptCursor {
        let code = self.code.iter().map(|op| render(op, args)).collect();
        ScriptCursor { code, pc: 0 }
    }

    /// Render the program as an indented listing
    pub fn listing(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("--- {} ---\n", self.name));
        out.push_str(&format!("ID: {}\n", self.id));
        if let Some(desc) = &self.description {
            out.push_str(desc);
            out.push('\n');
        }
        out.push_str(&format!("Instructions: {}\n\n", self.code.len()));
        for (i, op) in self.code.iter().enumerate() {
            out.push_str(&format!("{:3} |     {}\n", i, op.describe()));
        }
        out
    }
}

/// Executes a [`Program`] top to bottom, ignoring results
#[derive(Debug, Clone)]
pub struct ScriptCursor {
    code: Vec<Instruction>,
    pc: usize,
}

impl ScriptCursor {
    pub fn position(&self) -> usize {
        self.pc
    }
}

impl ControlProgram for ScriptCursor {
    fn resume(&mut self, _last: StepResult<'_>) -> Option<Instruction> {
        let op = self.code.get(self.pc).cloned();
        if op.is_some() {
            self.pc += 1;
        }
        op
    }
}

fn render(op: &Instruction, args: &ProgramArgs) -> Instruction {
    match op {
        Instruction::ToolCall {
            name,
            input,
            include_in_history,
        } => Instruction::ToolCall {
            name: name.clone(),
            input: input
                .iter()
                .map(|(k, v)| (k.clone(), render_value(v, args)))
                .collect(),
            include_in_history: *include_in_history,
        },
        Instruction::StepText { text } => Instruction::StepText {
            text: render_str(text, args),
        },
        other => other.clone(),
    }
}

fn render_value(value: &serde_json::Value, args: &ProgramArgs) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => {
            // A string that is exactly one param placeholder keeps the param's type
            if let Some(key) = s
                .strip_prefix("{{params.")
                .and_then(|rest| rest.strip_suffix("}}"))
            {
                if let Some(v) = args.params.get(key.trim()) {
                    return v.clone();
                }
            }
            serde_json::Value::String(render_str(s, args))
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| render_value(v, args)).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, args)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn render_str(template: &str, args: &ProgramArgs) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after[..end].trim();
        match lookup(key, args) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

fn lookup(key: &str, args: &ProgramArgs) -> Option<String> {
    if key == "prompt" {
        return Some(args.prompt.clone().unwrap_or_default());
    }
    let param = key.strip_prefix("params.")?;
    args.params.get(param).map(|v| match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

// =============================================================================
// State machines
// =============================================================================

/// A program written as a state value plus a transition function.
///
/// ```rust
/// use stepcraft_vm::{Instruction, StateMachine};
///
/// // Step once, then stop.
/// let program = StateMachine::new(false, |stepped: &mut bool, _last| {
///     if *stepped {
///         None
///     } else {
///         *stepped = true;
///         Some(Instruction::Step)
///     }
/// });
/// # let _ = program;
/// ```
pub struct StateMachine<S, F> {
    state: S,
    transition: F,
}

impl<S, F> StateMachine<S, F>
where
    S: Send,
    F: FnMut(&mut S, StepResult<'_>) -> Option<Instruction> + Send,
{
    pub fn new(state: S, transition: F) -> Self {
        Self { state, transition }
    }

    pub fn state(&self) -> &S {
        &self.state
    }
}

impl<S, F> ControlProgram for StateMachine<S, F>
where
    S: Send,
    F: FnMut(&mut S, StepResult<'_>) -> Option<Instruction> + Send,
{
    fn resume(&mut self, last: StepResult<'_>) -> Option<Instruction> {
        (self.transition)(&mut self.state, last)
    }
}
