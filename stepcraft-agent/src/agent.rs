//! Agent orchestrator: catalog lookup, engine wiring and run requests

use crate::catalog::AgentCatalog;
use crate::config::AgentConfig;
use crate::tools::builtin_tools;
use serde_json::{Map, Value};
use std::sync::Arc;
use stepcraft_vm::{
    AgentDefinition, AgentOutput, CancellationToken, Interpreter, Message, ModelInvoker, Result,
    RunContext, RunReport, ToolDispatcher,
};
use tracing::info;

/// A request to run one agent
#[derive(Debug, Clone, Default)]
pub struct AgentRequest {
    pub agent: String,
    pub prompt: Option<String>,
    pub params: Map<String, Value>,
    pub context: RunContext,
}

impl AgentRequest {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            ..Self::default()
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.context = self.context.with_intent(intent);
        self
    }

    /// Hand the parent's conversation to the agent
    pub fn with_conversation(mut self, conversation: Vec<Message>) -> Self {
        self.context = self.context.with_conversation(conversation);
        self
    }
}

/// Runs catalog agents on a shared interpreter
#[derive(Clone)]
pub struct Agent {
    catalog: Arc<AgentCatalog>,
    interpreter: Interpreter,
}

impl Agent {
    pub fn new(catalog: AgentCatalog, interpreter: Interpreter) -> Self {
        Self {
            catalog: Arc::new(catalog),
            interpreter,
        }
    }

    /// Wire the built-in tools, the configured provider and the catalog
    pub async fn from_config(config: &AgentConfig) -> Result<Self> {
        let invoker = config.provider.resolve().build()?;
        let tools: Arc<dyn ToolDispatcher> = Arc::new(builtin_tools(&config.workspace)?);
        Self::assemble(config, invoker, tools).await
    }

    /// Same as [`Agent::from_config`] with caller-supplied collaborators
    pub async fn assemble(
        config: &AgentConfig,
        invoker: Arc<dyn ModelInvoker>,
        tools: Arc<dyn ToolDispatcher>,
    ) -> Result<Self> {
        config.engine.validate()?;

        let mut catalog = AgentCatalog::with_builtins()?;
        if let Some(dir) = &config.agents_dir {
            let loaded = catalog.load_dir(dir).await?;
            info!(dir = %dir.display(), loaded, "loaded agent definitions");
        }

        let interpreter = Interpreter::new(invoker, tools).with_config(config.engine.clone());
        Ok(Self::new(catalog, interpreter))
    }

    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Cancelling this token aborts every run on this agent
    pub fn cancellation_token(&self) -> CancellationToken {
        self.interpreter.cancellation_token()
    }

    /// Run a catalog agent and return its output
    pub async fn run(&self, request: &AgentRequest) -> Result<AgentOutput> {
        self.run_with_report(request).await.map(|report| report.output)
    }

    /// Run a catalog agent and keep the final state and trace
    pub async fn run_with_report(&self, request: &AgentRequest) -> Result<RunReport> {
        let definition = self.catalog.get(&request.agent)?;
        self.run_definition(&definition, request).await
    }

    /// Run a definition that is not in the catalog. `request.agent` is ignored.
    pub async fn run_definition(
        &self,
        definition: &AgentDefinition,
        request: &AgentRequest,
    ) -> Result<RunReport> {
        let report = self
            .interpreter
            .run_with_report(
                definition,
                request.params.clone(),
                request.prompt.as_deref(),
                &request.context,
            )
            .await?;
        info!(
            agent = %definition.name,
            success = report.output.success,
            steps = report.trace.len(),
            "agent finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepcraft_vm::testing::{RecordingDispatcher, ScriptedInvoker};
    use stepcraft_vm::{ErrorKind, Instruction, Program, Role, ToolResult};

    async fn agent_with(invoker: ScriptedInvoker, tools: Arc<dyn ToolDispatcher>) -> Agent {
        Agent::assemble(&AgentConfig::default(), Arc::new(invoker), tools)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ask_returns_last_message() {
        let invoker = ScriptedInvoker::always("Paris.");
        let agent = agent_with(invoker.clone(), Arc::new(RecordingDispatcher::new())).await;

        let output = agent
            .run(&AgentRequest::new("ask").with_prompt("Capital of France?"))
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.text(), Some("Paris."));
        let request = &invoker.requests()[0];
        assert!(request.system.starts_with("You are a helpful assistant."));
        assert!(request.messages[0].content.contains("## Prompt\nCapital of France?"));
    }

    #[tokio::test]
    async fn test_unknown_agent_is_an_error() {
        let agent = agent_with(ScriptedInvoker::default(), Arc::new(RecordingDispatcher::new())).await;
        let err = agent.run(&AgentRequest::new("ghost")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AgentNotFound);
    }

    #[tokio::test]
    async fn test_file_summarizer_reads_through_builtin_tools() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "pub fn answer() -> u32 { 42 }").unwrap();

        let invoker = ScriptedInvoker::always("Defines answer().");
        let tools = Arc::new(builtin_tools(dir.path()).unwrap());
        let agent = agent_with(invoker.clone(), tools).await;

        let report = agent
            .run_with_report(&AgentRequest::new("file_summarizer").with_param("path", "lib.rs"))
            .await
            .unwrap();

        assert_eq!(report.output.text(), Some("Defines answer()."));
        assert_eq!(report.state.tool_calls().len(), 1);
        assert!(report.state.tool_calls()[0].result.success);

        let seen = &invoker.requests()[0].messages;
        assert!(seen.iter().any(|m| m.role == Role::User && m.content.contains("pub fn answer()")));
    }

    #[tokio::test]
    async fn test_brainstorm_keeps_longest_candidate() {
        let invoker = ScriptedInvoker::new(["a", "a much longer idea", "mid idea"]);
        let agent = agent_with(invoker.clone(), Arc::new(RecordingDispatcher::new())).await;

        let output = agent
            .run(&AgentRequest::new("brainstorm").with_prompt("names for a cat").with_param("n", 3))
            .await
            .unwrap();

        assert_eq!(invoker.calls(), 3);
        assert_eq!(output.text(), Some("a much longer idea"));
    }

    #[tokio::test]
    async fn test_planner_tracks_subgoals() {
        let plan = r#"{"goal": "release", "steps": [{"id": "build", "objective": "Build it"}, {"id": "ship", "objective": "Ship it"}]}"#;
        let agent = agent_with(ScriptedInvoker::always(plan), Arc::new(RecordingDispatcher::new())).await;

        let report = agent
            .run_with_report(&AgentRequest::new("planner").with_prompt("release v1"))
            .await
            .unwrap();

        assert!(report.output.success);
        assert_eq!(report.output.data.as_ref().and_then(|d| d.get("goal")), Some(&json!("release")));
        assert_eq!(report.state.subtasks().len(), 2);
        assert_eq!(report.state.subtask("ship").map(|s| s.objective.as_str()), Some("Ship it"));
    }

    #[tokio::test]
    async fn test_run_definition_outside_catalog() {
        let tools = RecordingDispatcher::new().with_result("search", ToolResult::ok("1 hit", "hit"));
        let agent = agent_with(ScriptedInvoker::always("Found it."), Arc::new(tools.clone())).await;

        let adhoc = AgentDefinition::new("adhoc", "").with_program(Program::new(
            "adhoc",
            "",
            vec![Instruction::tool("search", json!({"q": "{{prompt}}"})), Instruction::Step],
        ));
        let request = AgentRequest::new("ignored").with_prompt("needle");
        let report = agent.run_definition(&adhoc, &request).await.unwrap();

        assert_eq!(report.output.text(), Some("Found it."));
        assert_eq!(tools.calls()[0].input.get("q"), Some(&json!("needle")));
    }

    #[tokio::test]
    async fn test_assemble_loads_agents_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("echo.json"), r#"{"name": "echo", "system_prompt": "Echo."}"#).unwrap();

        let config = AgentConfig::default().with_agents_dir(dir.path());
        let agent = Agent::assemble(
            &config,
            Arc::new(ScriptedInvoker::default()),
            Arc::new(RecordingDispatcher::new()),
        )
        .await
        .unwrap();

        assert!(agent.catalog().contains("echo"));
        assert!(agent.catalog().contains("ask"));
    }

    #[tokio::test]
    async fn test_conversation_is_forwarded() {
        let invoker = ScriptedInvoker::default();
        let agent = agent_with(invoker.clone(), Arc::new(RecordingDispatcher::new())).await;

        let request = AgentRequest::new("ask")
            .with_conversation(vec![Message::new(Role::User, "earlier question")])
            .with_intent("wrap up");
        agent.run(&request).await.unwrap();

        let first = &invoker.requests()[0].messages[0].content;
        assert!(first.contains("user: earlier question"));
        assert!(first.contains("## User Intent\nwrap up"));
    }
}
