//! # Stepcraft CLI
//!
//! Command-line interface for running stepcraft agents.
//!
//! Usage:
//!   stepcraft run <agent> [prompt...]
//!   stepcraft agents
//!   stepcraft program <file.json> [prompt...]
//!
//! Examples:
//!   stepcraft run ask "What does Cargo.toml declare?"
//!   stepcraft run file_summarizer --params '{"path": "README.md"}'
//!   stepcraft run brainstorm -p '{"n": 5}' "names for a build tool"
//!   stepcraft --agents-dir agents --trace run reviewer -p '{"path": "src/lib.rs"}'
//!   stepcraft program demos/summarize.json

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use stepcraft_agent::{Agent, AgentConfig, AgentRequest};
use stepcraft_vm::{AgentDefinition, AgentOutput, Program, ProviderType, RunReport};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stepcraft")]
#[command(author, version, about = "Stepcraft - run agents written as declarative control programs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file (agents_dir, workspace, engine, provider)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory of *.json agent definitions
    #[arg(long, global = true)]
    agents_dir: Option<PathBuf>,

    /// Root directory for the filesystem tools
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Model provider: openai, anthropic or local
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model used when an agent does not name one
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Print the execution trace after the run
    #[arg(long, global = true)]
    trace: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print the final answer
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an agent from the catalog
    Run {
        /// Agent name
        agent: String,

        /// Prompt for the agent
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,

        #[command(flatten)]
        input: RunInput,
    },
    /// List available agents
    Agents,
    /// Run a program JSON file as an ad-hoc agent
    Program {
        /// Path to the program JSON file
        file: PathBuf,

        /// Prompt for the program
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,

        /// System prompt for the ad-hoc agent
        #[arg(long, default_value = "")]
        system: String,

        #[command(flatten)]
        input: RunInput,
    },
}

#[derive(clap::Args)]
struct RunInput {
    /// Parameters as a JSON object
    #[arg(short, long)]
    params: Option<String>,

    /// What the user is ultimately trying to do
    #[arg(short, long)]
    intent: Option<String>,
}

impl RunInput {
    fn into_request(self, agent: &str, prompt: Vec<String>) -> anyhow::Result<AgentRequest> {
        let mut request = AgentRequest::new(agent);
        if let Some(params) = self.params.as_deref() {
            request = request.with_params(parse_params(params)?);
        }
        if !prompt.is_empty() {
            request = request.with_prompt(prompt.join(" "));
        }
        if let Some(intent) = self.intent {
            request = request.with_intent(intent);
        }
        Ok(request)
    }
}

fn parse_params(raw: &str) -> anyhow::Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(raw).context("--params is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        other => bail!("--params must be a JSON object, got {}", other),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    let flat = s.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(if quiet { "error" } else { "warn" }))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_config(cli: &Cli) -> anyhow::Result<AgentConfig> {
    let mut config = match &cli.config {
        Some(path) => AgentConfig::load(path)
            .await
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AgentConfig::default(),
    };

    if let Some(dir) = &cli.agents_dir {
        config = config.with_agents_dir(dir);
    }
    if let Some(dir) = &cli.workspace {
        config = config.with_workspace(dir);
    }
    if let Some(provider) = &cli.provider {
        config = config.with_provider(provider.parse::<ProviderType>()?);
    }
    if let Some(model) = &cli.model {
        config = config.with_model(model);
    }
    tracing::debug!(?config, "resolved config");
    Ok(config)
}

/// Cancel in-flight runs on Ctrl-C
fn cancel_on_interrupt(agent: &Agent) {
    let token = agent.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

fn list_agents(agent: &Agent) {
    println!("Agents ({}):", agent.catalog().len());
    for definition in agent.catalog().iter() {
        println!(
            "  {:<18} {}",
            definition.name,
            definition.description.as_deref().unwrap_or("(no description)")
        );
    }
}

async fn load_program(file: &Path) -> anyhow::Result<Program> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing program {}", file.display()))
}

fn print_output(output: &AgentOutput, quiet: bool) {
    match (&output.data, output.text()) {
        (_, Some(text)) => println!("{}", text),
        (Some(data), None) => println!("{}", serde_json::to_string_pretty(data).unwrap_or_default()),
        (None, None) => println!("{}", output.summary),
    }
    if !quiet && !output.success {
        eprintln!("\nAgent did not succeed: {}", output.summary);
    }
}

fn print_trace(report: &RunReport) {
    eprintln!("\n--- Execution Trace ({} steps) ---", report.trace.len());
    for entry in &report.trace {
        eprintln!(
            "  {:3}. {} -> {}",
            entry.step,
            truncate(&entry.instruction.describe(), 40),
            truncate(&entry.result, 60)
        );
    }
    let subtasks = report.state.subtasks();
    if !subtasks.is_empty() {
        eprintln!("\n--- Subgoals ---");
        for subtask in subtasks.values() {
            eprintln!("  [{}] {}: {}", subtask.status, subtask.id, subtask.objective);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(&cli).await?;
    let agent = Agent::from_config(&config).await?;
    cancel_on_interrupt(&agent);

    let report = match cli.command {
        Commands::Agents => {
            list_agents(&agent);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Run {
            agent: name,
            prompt,
            input,
        } => {
            let request = input.into_request(&name, prompt)?;
            if !cli.quiet {
                eprintln!("Running agent: {}", name);
            }
            agent.run_with_report(&request).await?
        }
        Commands::Program {
            file,
            prompt,
            system,
            input,
        } => {
            let program = load_program(&file).await?;
            if !cli.quiet {
                eprintln!("Running program: {} ({} instructions)", program.id, program.code.len());
            }
            let definition = AgentDefinition::new(program.id.clone(), system).with_program(program);
            let request = input.into_request(&definition.name, prompt)?;
            agent.run_definition(&definition, &request).await?
        }
    };

    print_output(&report.output, cli.quiet);
    if cli.trace {
        print_trace(&report);
    }

    Ok(if report.output.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "stepcraft",
            "--trace",
            "run",
            "file_summarizer",
            "-p",
            r#"{"path": "README.md"}"#,
            "summarize",
            "briefly",
        ])
        .unwrap();

        assert!(cli.trace);
        match cli.command {
            Commands::Run { agent, prompt, input } => {
                assert_eq!(agent, "file_summarizer");
                let request = input.into_request(&agent, prompt).unwrap();
                assert_eq!(request.prompt.as_deref(), Some("summarize briefly"));
                assert_eq!(request.params.get("path"), Some(&Value::from("README.md")));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_params_must_be_object() {
        assert!(parse_params(r#"{"n": 3}"#).is_ok());
        assert!(parse_params("[1, 2]").is_err());
        assert!(parse_params("{oops").is_err());
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 8), "line one…");
        assert_eq!(truncate("ééééé", 2), "éé…");
    }
}
