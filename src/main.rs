//! Agent Platform CLI
//!
//! Drives agents, sessions and plans against the configured store.

use agent_platform::config::StoreConfig;
use agent_platform::planning::PlanRun;
use agent_platform::{
    Config, DocumentStore, EngineEvent, LanguageModel, MemoryStore, NewSession, Plan, Platform,
    ProviderClient, ScriptedModel, SessionStatus, SqliteStore, Telemetry, TurnRecord,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "agent-platform")]
#[command(about = "Agent Platform - permissioned tool-using agents with delegation and plans", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the YAML config file
    #[arg(short, long, default_value = "agent_platform.yaml")]
    config: PathBuf,

    /// Workspace to act in (overrides the config)
    #[arg(short, long)]
    workspace: Option<String>,

    /// LLM model to use (overrides the config)
    #[arg(short, long)]
    model: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered apps and tools
    Tools {
        /// Only this app
        #[arg(long)]
        app: Option<String>,
    },

    /// List the workspace's agents
    Agents,

    /// List the workspace's sessions
    Sessions {
        /// Filter by status (active, paused, completed)
        #[arg(long)]
        status: Option<String>,
    },

    /// Send a message to an agent
    Chat {
        message: String,

        /// Continue this session instead of starting a new one
        #[arg(short, long)]
        session: Option<String>,

        /// Agent for a new session (default: the workspace manager)
        #[arg(short, long)]
        agent: Option<String>,

        /// Start the new session without tools
        #[arg(long)]
        chat_only: bool,

        /// Extra context for the system prompt
        #[arg(long)]
        context: Option<String>,
    },

    /// Generate a plan for a message and store it on a session
    Plan {
        message: String,

        #[arg(short, long)]
        session: Option<String>,

        #[arg(short, long)]
        agent: Option<String>,

        #[arg(long)]
        context: Option<String>,
    },

    /// Show a session's plan
    ShowPlan { session: String },

    /// Approve a session's plan
    Approve { session: String },

    /// Execute the pending steps of an approved plan
    RunPlan { session: String },

    /// Skip a pending plan step
    Skip { session: String, step: String },

    /// Show tool usage statistics
    Stats,
}

impl Commands {
    fn needs_model(&self) -> bool {
        matches!(self, Commands::Chat { .. } | Commands::Plan { .. })
    }
}

fn open_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    Ok(match config {
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
        StoreConfig::Sqlite { path } => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Arc::new(
                SqliteStore::open(path)
                    .with_context(|| format!("Failed to open store {}", path.display()))?,
            )
        }
    })
}

fn open_model(config: &Config, needed: bool) -> Result<Arc<dyn LanguageModel>> {
    if !needed {
        return Ok(Arc::new(ScriptedModel::new()));
    }
    let provider = config.llm.provider_config()?;
    Ok(Arc::new(ProviderClient::new(provider)?))
}

/// Print engine events to stderr as they happen
fn spawn_event_printer() -> mpsc::UnboundedSender<EngineEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                EngineEvent::ToolCallStart { tool, arguments, .. } => {
                    eprintln!("  -> {} {}", tool, arguments);
                }
                EngineEvent::ToolCallEnd {
                    tool,
                    success,
                    duration_ms,
                    ..
                } => {
                    let mark = if success { "ok" } else { "failed" };
                    eprintln!("  <- {} {} ({}ms)", tool, mark, duration_ms);
                }
                EngineEvent::DelegationStart { delegate, task, .. } => {
                    eprintln!("  => delegating to {}: {}", delegate, task);
                }
                EngineEvent::DelegationEnd { delegate, .. } => {
                    eprintln!("  <= {} finished", delegate);
                }
                EngineEvent::TurnStart { .. } | EngineEvent::TurnComplete { .. } => {}
            }
        }
    });
    tx
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(Some(&cli.config))?.with_verbose(cli.verbose);
    if let Some(workspace) = &cli.workspace {
        config.workspace_id = workspace.clone();
    }
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }

    let telemetry = Telemetry::init(
        &config.telemetry,
        Some(config.llm.provider.as_str()),
        Some(config.llm.model.as_str()),
    )?;

    let store = open_store(&config.store)?;
    let model = open_model(&config, cli.command.needs_model())?;
    let events = cli.command.needs_model().then(spawn_event_printer);
    let workspace_id = config.workspace_id.clone();
    let user_id = config.user_id.clone();

    let platform = Platform::build(config, store, model, events).await?;
    platform.seed_agents(&workspace_id)?;

    match cli.command {
        Commands::Tools { app } => show_tools(&platform, app.as_deref()),
        Commands::Agents => show_agents(&platform, &workspace_id)?,
        Commands::Sessions { status } => {
            let status = status.map(|s| s.parse::<SessionStatus>()).transpose()?;
            for session in platform.sessions().list(&workspace_id, None, status)? {
                println!(
                    "{}  {:<9}  {:<12}  {}",
                    session.id,
                    session.status,
                    session.agent_id,
                    session.title.as_deref().unwrap_or("(untitled)")
                );
            }
        }
        Commands::Chat {
            message,
            session,
            agent,
            chat_only,
            context,
        } => {
            let session_id =
                resolve_session(&platform, session, agent, &workspace_id, &user_id, chat_only)?;
            let agent_id = platform.sessions().get(&session_id)?.agent_id;
            println!("Session: {}", session_id);

            let start = Instant::now();
            let result = platform
                .send_message(&session_id, &user_id, &message, context.as_deref())
                .await;
            let elapsed = start.elapsed().as_millis() as u64;

            match result {
                Ok(exchange) => {
                    telemetry.record_turn(&TurnRecord::completed(
                        &session_id,
                        &agent_id,
                        &exchange.model,
                        exchange.reason,
                        &exchange.tool_calls,
                        elapsed,
                    ));
                    println!("{}", exchange.assistant_message.content);
                }
                Err(e) => {
                    telemetry.record_turn(&TurnRecord::failed(
                        &session_id,
                        &agent_id,
                        e.to_string(),
                        elapsed,
                    ));
                    return Err(e.into());
                }
            }
        }
        Commands::Plan {
            message,
            session,
            agent,
            context,
        } => {
            let session_id =
                resolve_session(&platform, session, agent, &workspace_id, &user_id, false)?;
            if !platform.should_plan(&session_id, &user_id, &message)? {
                eprintln!("(message does not look like a multi-step task; planning anyway)");
            }
            let plan = platform
                .create_plan(&session_id, &user_id, &message, context.as_deref())
                .await?;
            println!("Session: {}", session_id);
            print_plan(&plan);
        }
        Commands::ShowPlan { session } => print_plan(&platform.get_plan(&session, &user_id)?),
        Commands::Approve { session } => print_plan(&platform.approve_plan(&session, &user_id)?),
        Commands::RunPlan { session } => {
            let run = platform.execute_plan(&session, &user_id).await?;
            print_run(&run);
        }
        Commands::Skip { session, step } => {
            let step = platform.skip_step(&session, &user_id, &step)?;
            println!("{} {}", step.id, step.status);
        }
        Commands::Stats => {
            println!("Telemetry Database: {}\n", telemetry.log_dir().join("telemetry.db").display());
            let stats = telemetry.tool_stats()?;
            if stats.is_empty() {
                println!("  No tool calls recorded.");
            }
            for stat in stats {
                println!("  {}", stat);
            }
        }
    }

    Ok(())
}

/// Existing session, or a new one with the given agent (default: the manager)
fn resolve_session(
    platform: &Platform,
    session: Option<String>,
    agent: Option<String>,
    workspace_id: &str,
    user_id: &str,
    chat_only: bool,
) -> Result<String> {
    if let Some(session_id) = session {
        return Ok(session_id);
    }
    let agent_id = match agent {
        Some(agent_id) => agent_id,
        None => platform.agents().ensure_default_manager(workspace_id)?.id,
    };
    let session = platform.start_session(NewSession {
        workspace_id: workspace_id.to_string(),
        agent_id,
        user_id: user_id.to_string(),
        chat_only,
        ..Default::default()
    })?;
    Ok(session.id)
}

fn show_tools(platform: &Platform, app: Option<&str>) {
    for def in platform.registry().list_apps() {
        if app.is_some_and(|a| a != def.app_id) {
            continue;
        }
        println!("{} ({})", def.name, def.app_id);
        for tool in &def.tools {
            println!("  {:<40} {}", tool.tool_id, tool.name);
        }
    }
}

fn show_agents(platform: &Platform, workspace_id: &str) -> Result<()> {
    for agent in platform.agents().list_agents(workspace_id)? {
        let apps = agent.granted_app_ids().join(", ");
        let role = if agent.is_orchestrating() {
            "orchestrator"
        } else {
            "specialist"
        };
        println!(
            "{:<20} {:<24} {:<12} {}",
            agent.id,
            agent.name,
            role,
            if apps.is_empty() { "-" } else { apps.as_str() }
        );
    }
    Ok(())
}

fn print_plan(plan: &Plan) {
    println!("Goal: {}", plan.goal);
    println!("Status: {}", plan.status);
    for step in &plan.steps {
        println!(
            "  [{:<11}] {:<8} {}{}",
            step.status,
            step.id,
            step.description,
            step.tool_id
                .as_deref()
                .map(|t| format!(" ({})", t))
                .unwrap_or_default()
        );
    }
}

fn print_run(run: &PlanRun) {
    println!("Plan status: {}", run.plan_status);
    for result in &run.step_results {
        println!("  {}", result);
    }
}
