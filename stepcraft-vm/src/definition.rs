//! # Agent Definitions
//!
//! Immutable description of an agent: identity, prompts, tool allow-list,
//! output contract and the control program. A definition is read-only while
//! it runs and may back many concurrent runs; each run instantiates its own
//! program.

use crate::program::{ControlProgram, Program, ProgramArgs};
use crate::registry::Named;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How the final execution state is turned into a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Text of the most recent assistant message
    #[default]
    LastMessage,
    /// Every assistant message, in order
    AllMessages,
    /// The most recent assistant message, parsed as JSON
    StructuredOutput,
}

/// Builds a fresh native program for one run
pub type ProgramFactory = Arc<dyn Fn(&ProgramArgs) -> Box<dyn ControlProgram> + Send + Sync>;

#[derive(Clone)]
struct NativeFactory(ProgramFactory);

impl fmt::Debug for NativeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NativeFactory(..)")
    }
}

/// Where an agent's control program comes from
#[derive(Clone, Default)]
pub enum ProgramSource {
    /// Keep stepping until the model is done
    #[default]
    Default,
    /// A scripted instruction list
    Script(Program),
    /// Rust code building a program per run
    Native(ProgramFactory),
}

impl fmt::Debug for ProgramSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramSource::Default => f.write_str("Default"),
            ProgramSource::Script(program) => f.debug_tuple("Script").field(&program.id).finish(),
            ProgramSource::Native(_) => f.write_str("Native(..)"),
        }
    }
}

/// An agent definition.
///
/// Deserializes from the JSON agent files; native programs can only be
/// attached from Rust via [`AgentDefinition::with_native_program`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Model identifier passed to the invoker
    #[serde(default)]
    pub model: String,
    /// `None` means every tool is allowed
    #[serde(default)]
    pub tool_names: Option<Vec<String>>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub instructions_prompt: Option<String>,
    /// Appended as a reminder block on every model call
    #[serde(default)]
    pub step_prompt: Option<String>,
    #[serde(default)]
    pub output_mode: OutputMode,
    /// Scripted program from the definition file
    #[serde(default, rename = "program")]
    script: Option<Program>,
    #[serde(skip)]
    native: Option<NativeFactory>,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            model: String::new(),
            tool_names: None,
            system_prompt: system_prompt.into(),
            instructions_prompt: None,
            step_prompt: None,
            output_mode: OutputMode::default(),
            script: None,
            native: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions_prompt = Some(instructions.into());
        self
    }

    pub fn with_step_prompt(mut self, step_prompt: impl Into<String>) -> Self {
        self.step_prompt = Some(step_prompt.into());
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn with_program(mut self, program: Program) -> Self {
        self.script = Some(program);
        self.native = None;
        self
    }

    pub fn with_native_program<F, P>(mut self, factory: F) -> Self
    where
        F: Fn(&ProgramArgs) -> P + Send + Sync + 'static,
        P: ControlProgram + 'static,
    {
        self.native = Some(NativeFactory(Arc::new(move |args: &ProgramArgs| {
            Box::new(factory(args)) as Box<dyn ControlProgram>
        })));
        self.script = None;
        self
    }

    pub fn program_source(&self) -> ProgramSource {
        if let Some(NativeFactory(factory)) = &self.native {
            ProgramSource::Native(factory.clone())
        } else if let Some(program) = &self.script {
            ProgramSource::Script(program.clone())
        } else {
            ProgramSource::Default
        }
    }

    /// The scripted program, if the definition carries one
    pub fn script(&self) -> Option<&Program> {
        self.script.as_ref()
    }

    /// Instantiate the control program for one run
    pub fn start_program(&self, args: &ProgramArgs) -> Box<dyn ControlProgram> {
        match self.program_source() {
            ProgramSource::Native(factory) => factory(args),
            ProgramSource::Script(program) => Box::new(program.start(args)),
            ProgramSource::Default => Box::new(Program::default_steps().start(args)),
        }
    }
}

impl Named for AgentDefinition {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use crate::program::{StateMachine, StepResult};
    use crate::state::ExecutionState;
    use serde_json::json;

    #[test]
    fn test_definition_from_json() {
        let def: AgentDefinition = serde_json::from_value(json!({
            "name": "file_summarizer",
            "model": "gpt-4o-mini",
            "tool_names": ["read_file"],
            "system_prompt": "You summarize files.",
            "step_prompt": "Be brief.",
            "output_mode": "structured_output",
            "program": {
                "id": "summarize",
                "code": [{"op": "STEP"}]
            }
        }))
        .unwrap();

        assert_eq!(def.tool_names, Some(vec!["read_file".to_string()]));
        assert_eq!(def.output_mode, OutputMode::StructuredOutput);
        assert!(matches!(def.program_source(), ProgramSource::Script(_)));
    }

    #[test]
    fn test_minimal_definition_defaults() {
        let def: AgentDefinition = serde_json::from_value(json!({"name": "ask"})).unwrap();
        assert_eq!(def.tool_names, None);
        assert_eq!(def.output_mode, OutputMode::LastMessage);
        assert!(matches!(def.program_source(), ProgramSource::Default));

        let state = ExecutionState::default();
        let mut program = def.start_program(&ProgramArgs::default());
        assert_eq!(program.resume(StepResult::initial(&state)), Some(Instruction::StepAll));
        assert_eq!(program.resume(StepResult::initial(&state)), None);
    }

    #[test]
    fn test_native_program_is_fresh_per_run() {
        let def = AgentDefinition::new("once", "").with_native_program(|_args: &ProgramArgs| {
            StateMachine::new(false, |done: &mut bool, _last: StepResult<'_>| {
                if *done {
                    None
                } else {
                    *done = true;
                    Some(Instruction::Step)
                }
            })
        });

        let state = ExecutionState::default();
        for _ in 0..2 {
            let mut program = def.start_program(&ProgramArgs::default());
            assert_eq!(program.resume(StepResult::initial(&state)), Some(Instruction::Step));
            assert_eq!(program.resume(StepResult::initial(&state)), None);
        }
    }
}
