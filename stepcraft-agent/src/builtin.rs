//! Agents that ship with stepcraft

use serde_json::{json, Value};
use std::collections::VecDeque;
use stepcraft_vm::{
    parse_structured, AgentDefinition, Instruction, OutputMode, Program, ProgramArgs, Role,
    StateMachine, StepResult,
};

/// Candidates a `brainstorm` run generates unless `params.n` says otherwise
pub const DEFAULT_BRAINSTORM_N: usize = 3;

/// Every built-in agent definition
pub fn builtin_agents() -> Vec<AgentDefinition> {
    vec![ask(), brainstorm(), planner(), file_summarizer()]
}

/// General question answering. Uses the default program (step until done).
pub fn ask() -> AgentDefinition {
    AgentDefinition::new(
        "ask",
        "You are a helpful assistant. Answer the user's request directly and concisely.",
    )
    .with_description("Answer a question or carry out a short request")
    .with_tools(Vec::<String>::new())
}

/// Generate several candidate answers concurrently and keep the longest.
pub fn brainstorm() -> AgentDefinition {
    AgentDefinition::new(
        "brainstorm",
        "You are a creative collaborator. Produce one complete, self-contained idea per reply.",
    )
    .with_description("Fan out several candidate ideas and keep the most developed one")
    .with_tools(Vec::<String>::new())
    .with_native_program(|args: &ProgramArgs| {
        let n = args
            .params
            .get("n")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_BRAINSTORM_N);
        StateMachine::new(BrainstormPhase::Generate, move |phase: &mut BrainstormPhase, last: StepResult<'_>| {
            brainstorm_transition(phase, last, n)
        })
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrainstormPhase {
    Generate,
    Pick,
    Done,
}

fn brainstorm_transition(
    phase: &mut BrainstormPhase,
    last: StepResult<'_>,
    n: usize,
) -> Option<Instruction> {
    match *phase {
        BrainstormPhase::Generate => {
            *phase = BrainstormPhase::Pick;
            Some(Instruction::GenerateN { n })
        }
        BrainstormPhase::Pick => {
            *phase = BrainstormPhase::Done;
            let best = last.responses.iter().max_by_key(|r| r.chars().count())?;
            Some(Instruction::add_message(Role::Assistant, best.clone()))
        }
        BrainstormPhase::Done => None,
    }
}

const PLANNER_PROMPT: &str = "You are a planner. Break the user's goal into concrete steps. \
Reply with JSON only, shaped as \
{\"goal\": string, \"steps\": [{\"id\": string, \"objective\": string}]}.";

/// Produce a JSON plan and register each step as a subgoal.
pub fn planner() -> AgentDefinition {
    AgentDefinition::new("planner", PLANNER_PROMPT)
        .with_description("Turn a goal into a JSON plan and track its steps as subgoals")
        .with_tools(Vec::<String>::new())
        .with_output_mode(OutputMode::StructuredOutput)
        .with_native_program(|_args: &ProgramArgs| {
            StateMachine::new(PlannerState::default(), planner_transition)
        })
}

#[derive(Debug, Default)]
struct PlannerState {
    planned: bool,
    pending: VecDeque<Instruction>,
}

fn planner_transition(state: &mut PlannerState, last: StepResult<'_>) -> Option<Instruction> {
    if !state.planned {
        state.planned = true;
        return Some(Instruction::Step);
    }
    if last.text().is_some() {
        state.pending = last.text().map(subgoals_from_plan).unwrap_or_default();
    }
    state.pending.pop_front()
}

/// One `add_subgoal` per plan step; unparseable plans yield nothing
fn subgoals_from_plan(text: &str) -> VecDeque<Instruction> {
    let plan = match parse_structured(text) {
        Ok(plan) => plan,
        Err(_) => return VecDeque::new(),
    };
    let steps = match plan.get("steps").and_then(Value::as_array) {
        Some(steps) => steps,
        None => return VecDeque::new(),
    };

    steps
        .iter()
        .enumerate()
        .filter_map(|(i, step)| {
            let objective = step.get("objective").and_then(Value::as_str)?;
            let id = step
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("step-{}", i + 1));
            Some(Instruction::quiet_tool(
                "add_subgoal",
                json!({ "id": id, "objective": objective, "status": "pending" }),
            ))
        })
        .collect()
}

/// Read `params.path` and summarize it. Only `read_file` is allowed.
pub fn file_summarizer() -> AgentDefinition {
    let program = Program::new(
        "summarize-file",
        "Summarize file",
        vec![
            Instruction::tool("read_file", json!({ "path": "{{params.path}}" })),
            Instruction::Step,
        ],
    )
    .with_description("Read one file, then summarize it in a single model step");

    AgentDefinition::new(
        "file_summarizer",
        "You summarize files. Describe what the file is for and its key points in a short paragraph.",
    )
    .with_description("Summarize the file at params.path")
    .with_tools(["read_file"])
    .with_program(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepcraft_vm::{ControlProgram, ExecutionState, Outcome};

    #[test]
    fn test_builtin_names_are_unique() {
        let mut names: Vec<_> = builtin_agents().into_iter().map(|a| a.name).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn test_brainstorm_picks_longest() {
        let state = ExecutionState::default();
        let mut phase = BrainstormPhase::Generate;

        let first = brainstorm_transition(&mut phase, StepResult::initial(&state), 3);
        assert_eq!(first, Some(Instruction::GenerateN { n: 3 }));

        let responses = vec!["short".to_string(), "the longest idea".to_string(), "mid idea".to_string()];
        let after = StepResult {
            responses: &responses,
            ..StepResult::initial(&state)
        };
        assert_eq!(
            brainstorm_transition(&mut phase, after, 3),
            Some(Instruction::add_message(Role::Assistant, "the longest idea"))
        );
        assert_eq!(brainstorm_transition(&mut phase, after, 3), None);
    }

    #[test]
    fn test_brainstorm_reads_n_from_params() {
        let def = brainstorm();
        let args = ProgramArgs {
            params: json!({"n": 5}).as_object().cloned().unwrap_or_default(),
            prompt: None,
        };
        let state = ExecutionState::default();
        let mut program = def.start_program(&args);
        assert_eq!(
            program.resume(StepResult::initial(&state)),
            Some(Instruction::GenerateN { n: 5 })
        );
    }

    #[test]
    fn test_plan_steps_become_subgoals() {
        let text = "```json\n{\"goal\": \"ship\", \"steps\": [{\"id\": \"a\", \"objective\": \"build\"}, {\"objective\": \"test\"}]}\n```";
        let subgoals: Vec<_> = subgoals_from_plan(text).into_iter().collect();

        assert_eq!(subgoals.len(), 2);
        assert_eq!(
            subgoals[1],
            Instruction::quiet_tool(
                "add_subgoal",
                json!({"id": "step-2", "objective": "test", "status": "pending"})
            )
        );
        assert!(subgoals_from_plan("not json").is_empty());
    }

    #[test]
    fn test_planner_steps_then_tracks() {
        let state = ExecutionState::default();
        let mut planner_state = PlannerState::default();

        assert_eq!(
            planner_transition(&mut planner_state, StepResult::initial(&state)),
            Some(Instruction::Step)
        );

        let outcome = Outcome::Model(r#"{"steps": [{"id": "x", "objective": "do x"}]}"#.to_string());
        let after_step = StepResult {
            outcome: Some(&outcome),
            ..StepResult::initial(&state)
        };
        assert!(matches!(
            planner_transition(&mut planner_state, after_step),
            Some(Instruction::ToolCall { .. })
        ));
        assert_eq!(planner_transition(&mut planner_state, StepResult::initial(&state)), None);
    }
}
