//! Composition root
//!
//! `Platform` owns the single tool registry and wires the store, model,
//! resolver, execution engine, orchestrator and planning engine together.
//! Every caller-facing operation checks session ownership first.

use crate::agent::{Agent, AgentDirectory, ExecutionEngine, PermissionResolver};
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::events::{EventSender, ExecutionOutcome, ToolCallTrace, TurnCompleteReason};
use crate::mcp::McpConnectionManager;
use crate::message::{MessageRole, SessionMessage};
use crate::orchestration::Orchestrator;
use crate::planning::{KeywordClassifier, Plan, PlanRun, PlanStep, PlanningEngine};
use crate::provider::LanguageModel;
use crate::session::{generate_title, NewSession, Session, SessionService};
use crate::store::{fields_from, DocumentStore, Fields};
use crate::templates::Templates;
use crate::tool::ToolRegistry;
use crate::tools::catalog_registry;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Both sides of one exchange plus what happened in between
#[derive(Debug, Clone, Serialize)]
pub struct MessageExchange {
    pub user_message: SessionMessage,
    pub assistant_message: SessionMessage,
    pub model: String,
    pub tool_calls: Vec<ToolCallTrace>,
    pub reason: TurnCompleteReason,
}

pub struct Platform {
    config: Config,
    store: Arc<dyn DocumentStore>,
    registry: Arc<ToolRegistry>,
    sessions: SessionService,
    agents: AgentDirectory,
    engine: ExecutionEngine,
    orchestrator: Arc<Orchestrator>,
    planner: PlanningEngine,
    mcp: McpConnectionManager,
}

impl Platform {
    /// Register the catalog, discover remote tools, then freeze the registry
    pub async fn build(
        config: Config,
        store: Arc<dyn DocumentStore>,
        model: Arc<dyn LanguageModel>,
        events: Option<EventSender>,
    ) -> Result<Self> {
        let mut registry = catalog_registry()?;
        let mut mcp = McpConnectionManager::new();
        let remote = mcp.register_all(&mut registry, &config.mcp_servers).await?;
        let registry = registry.into_shared();
        info!(
            apps = registry.list_apps().len(),
            tools = registry.len(),
            remote_tools = remote,
            "Tool registry ready"
        );

        let sessions = SessionService::new(store.clone());
        let agents = AgentDirectory::new(store.clone());
        let mut engine = ExecutionEngine::new(
            PermissionResolver::new(registry.clone()),
            sessions.clone(),
            store.clone(),
            model,
            Templates::new()?,
        );
        if let Some(events) = events {
            engine = engine.with_events(events);
        }
        let orchestrator = Orchestrator::new(engine.clone(), agents.clone());
        let planner = PlanningEngine::new(
            engine.clone(),
            Arc::new(KeywordClassifier::new(&config.planning)),
        );

        Ok(Self {
            config,
            store,
            registry,
            sessions,
            agents,
            engine,
            orchestrator,
            planner,
            mcp,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    pub fn agents(&self) -> &AgentDirectory {
        &self.agents
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn planner(&self) -> &PlanningEngine {
        &self.planner
    }

    pub fn mcp(&self) -> &McpConnectionManager {
        &self.mcp
    }

    /// Make sure the workspace has its default manager, then load YAML
    /// profiles from `agents_dir` when configured
    pub fn seed_agents(&self, workspace_id: &str) -> Result<usize> {
        self.agents.ensure_default_manager(workspace_id)?;
        match &self.config.agents_dir {
            Some(dir) if dir.is_dir() => self.agents.seed_from_dir(dir, workspace_id),
            _ => Ok(0),
        }
    }

    /// Open a session with an agent of the same workspace
    pub fn start_session(&self, params: NewSession) -> Result<Session> {
        let agent = self.agents.get_agent(&params.agent_id)?;
        if agent.workspace_id != params.workspace_id {
            return Err(EngineError::Forbidden(
                "Agent does not belong to the specified workspace".to_string(),
            ));
        }
        self.sessions.create(params)
    }

    /// Session owned by `user_id`
    pub fn owned_session(&self, session_id: &str, user_id: &str) -> Result<Session> {
        let session = self.sessions.get(session_id)?;
        if session.user_id != user_id {
            return Err(EngineError::Forbidden("You do not own this session".to_string()));
        }
        Ok(session)
    }

    fn session_agent(&self, session_id: &str, user_id: &str) -> Result<(Session, Agent)> {
        let session = self.owned_session(session_id, user_id)?;
        let agent = self.agents.get_agent(&session.agent_id)?;
        Ok((session, agent))
    }

    /// Persist the user's message, run the agent and persist its answer
    pub async fn send_message(
        &self,
        session_id: &str,
        user_id: &str,
        message: &str,
        context: Option<&str>,
    ) -> Result<MessageExchange> {
        let session = self.owned_session(session_id, user_id)?;
        if !session.is_active() {
            return Err(EngineError::transition(
                "Cannot send messages to a non-active session",
            ));
        }

        let user_message = self
            .sessions
            .add_message(session_id, MessageRole::User, message, Fields::new())?;
        if session.title.as_deref().map_or(true, str::is_empty) {
            self.sessions.set_title(session_id, &generate_title(message))?;
        }

        let agent = self.agents.get_agent(&session.agent_id)?;
        let outcome = self.run_turn(&agent, &session, context).await?;

        let assistant_message = self.sessions.add_message(
            session_id,
            MessageRole::Assistant,
            outcome.response.as_str(),
            fields_from(json!({ "model": outcome.model })),
        )?;

        Ok(MessageExchange {
            user_message,
            assistant_message,
            model: outcome.model,
            tool_calls: outcome.tool_calls,
            reason: outcome.reason,
        })
    }

    async fn run_turn(
        &self,
        agent: &Agent,
        session: &Session,
        context: Option<&str>,
    ) -> Result<ExecutionOutcome> {
        let extra = self.orchestrator.tools_for(agent, &session.id);
        let use_tools = self.engine.has_tools(agent) || !extra.is_empty();
        if session.is_chat_only() || !use_tools {
            self.engine.chat(agent, &session.id, context).await
        } else {
            self.engine
                .execute_with(agent, &session.id, context, extra)
                .await
        }
    }

    /// Whether the session's agent would plan this message
    pub fn should_plan(&self, session_id: &str, user_id: &str, message: &str) -> Result<bool> {
        let (_, agent) = self.session_agent(session_id, user_id)?;
        Ok(self.planner.should_use_planning(&agent, message))
    }

    /// Generate a plan for `message` and store it on the session
    pub async fn create_plan(
        &self,
        session_id: &str,
        user_id: &str,
        message: &str,
        context: Option<&str>,
    ) -> Result<Plan> {
        let (_, agent) = self.session_agent(session_id, user_id)?;
        let plan = self.planner.generate_plan(&agent, message, context).await?;
        self.planner.store_plan(session_id, &plan)?;
        Ok(plan)
    }

    pub fn get_plan(&self, session_id: &str, user_id: &str) -> Result<Plan> {
        self.owned_session(session_id, user_id)?;
        self.planner.get_plan(session_id)?.ok_or(EngineError::NoPlan)
    }

    pub fn approve_plan(&self, session_id: &str, user_id: &str) -> Result<Plan> {
        self.owned_session(session_id, user_id)?;
        self.planner.approve_plan(session_id)
    }

    pub async fn execute_plan(&self, session_id: &str, user_id: &str) -> Result<PlanRun> {
        let (_, agent) = self.session_agent(session_id, user_id)?;
        self.planner.execute_plan(&agent, session_id).await
    }

    pub fn skip_step(&self, session_id: &str, user_id: &str, step_id: &str) -> Result<PlanStep> {
        self.owned_session(session_id, user_id)?;
        self.planner.skip_step(session_id, step_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::PlanStatus;
    use crate::provider::{ModelReply, ScriptedModel};
    use crate::session::SessionStatus;
    use crate::store::MemoryStore;
    use crate::tool::ToolAction;

    async fn platform(model: ScriptedModel) -> Platform {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        Platform::build(Config::default(), store, Arc::new(model), None)
            .await
            .unwrap()
    }

    fn session_with(p: &Platform, agent: Agent, chat_only: bool) -> Session {
        let agent = p.agents().save_agent(&agent).unwrap();
        p.start_session(NewSession {
            workspace_id: "ws-1".to_string(),
            agent_id: agent.id,
            user_id: "user-1".to_string(),
            chat_only,
            ..Default::default()
        })
        .unwrap()
    }

    fn pyramid_bot() -> Agent {
        Agent::new("pyr", "ws-1", "Pyramid Bot").with_grant("pyramids", &ToolAction::ALL)
    }

    #[tokio::test]
    async fn test_send_message_runs_tools_and_titles_session() {
        let p = platform(
            ScriptedModel::new()
                .with_reply(ModelReply::tool_call("c1", "pyramids.create", json!({"title": "Q3"})))
                .with_text("Created the Q3 pyramid."),
        )
        .await;
        let session = session_with(&p, pyramid_bot(), false);

        let exchange = p
            .send_message(&session.id, "user-1", "Create a pyramid called Q3", None)
            .await
            .unwrap();
        assert_eq!(exchange.assistant_message.content, "Created the Q3 pyramid.");
        assert_eq!(exchange.model, "scripted");
        assert_eq!(exchange.tool_calls.len(), 1);
        assert_eq!(exchange.assistant_message.metadata_str("model"), Some("scripted"));

        let stored = p.sessions().get(&session.id).unwrap();
        assert_eq!(stored.title.as_deref(), Some("Create a pyramid called Q3"));
        let roles: Vec<MessageRole> = stored.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::User,
                MessageRole::ToolCall,
                MessageRole::ToolResult,
                MessageRole::Assistant
            ]
        );
    }

    #[tokio::test]
    async fn test_chat_only_session_skips_tools() {
        let model = Arc::new(ScriptedModel::new().with_text("Just chatting."));
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let p = Platform::build(Config::default(), store, model.clone(), None)
            .await
            .unwrap();
        let session = session_with(&p, pyramid_bot(), true);

        let exchange = p
            .send_message(&session.id, "user-1", "hi", None)
            .await
            .unwrap();
        assert!(exchange.tool_calls.is_empty());
        assert!(model.requests()[0].tool_names.is_empty());
    }

    #[tokio::test]
    async fn test_manager_gets_delegation_tool() {
        let model = Arc::new(ScriptedModel::new().with_text("Hello from the manager."));
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let p = Platform::build(Config::default(), store, model.clone(), None)
            .await
            .unwrap();
        let manager = p.agents().ensure_default_manager("ws-1").unwrap();
        let session = session_with(&p, manager, false);

        p.send_message(&session.id, "user-1", "hi", None).await.unwrap();
        let tools = &model.requests()[0].tool_names;
        assert_eq!(tools[0], "orchestration.delegate");
        assert_eq!(tools.len(), p.registry().len() + 1);
    }

    #[tokio::test]
    async fn test_send_message_guards() {
        let p = platform(ScriptedModel::new().repeating(ModelReply::text("ok"))).await;
        let session = session_with(&p, pyramid_bot(), false);

        let err = p
            .send_message(&session.id, "intruder", "hi", None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "You do not own this session");

        p.sessions()
            .update_status(&session.id, SessionStatus::Paused)
            .unwrap();
        let err = p
            .send_message(&session.id, "user-1", "hi", None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot send messages to a non-active session");
        assert!(p.sessions().get(&session.id).unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_start_session_checks_workspace() {
        let p = platform(ScriptedModel::new()).await;
        p.agents().save_agent(&pyramid_bot()).unwrap();
        let err = p
            .start_session(NewSession {
                workspace_id: "ws-2".to_string(),
                agent_id: "pyr".to_string(),
                user_id: "user-1".to_string(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_plan_lifecycle() {
        let reply = json!({
            "goal": "Stand up Q3",
            "steps": [
                {"description": "Create the pyramid", "tool_id": "pyramids.create", "args": {"title": "Q3"}},
                {"description": "Tell the team"}
            ]
        });
        let p = platform(ScriptedModel::new().with_text(&reply.to_string())).await;
        let session = session_with(&p, pyramid_bot(), false);

        assert!(p
            .should_plan(&session.id, "user-1", "Plan the Q3 setup")
            .unwrap());
        let plan = p
            .create_plan(&session.id, "user-1", "Plan the Q3 setup", None)
            .await
            .unwrap();
        assert_eq!(plan.status, PlanStatus::AwaitingApproval);
        assert_eq!(p.get_plan(&session.id, "user-1").unwrap(), plan);

        p.skip_step(&session.id, "user-1", "step-2").unwrap();
        p.approve_plan(&session.id, "user-1").unwrap();
        let run = p.execute_plan(&session.id, "user-1").await.unwrap();
        assert_eq!(run.plan_status, PlanStatus::Completed);
        assert_eq!(run.step_results.len(), 1);

        let err = p.get_plan(&session.id, "someone-else").unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_seed_agents_creates_default_manager() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("writer.yaml"),
            "name: Writer\nappAccess:\n  - appId: context_documents\n    permissions: [create, read]\n",
        )
        .unwrap();

        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let config = Config {
            agents_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let p = Platform::build(config, store, Arc::new(ScriptedModel::new()), None)
            .await
            .unwrap();

        assert_eq!(p.seed_agents("ws-1").unwrap(), 1);
        let agents = p.agents().list_agents("ws-1").unwrap();
        assert_eq!(agents.len(), 2);
        assert!(agents.iter().any(|a| a.is_default && a.is_manager()));
        assert_eq!(p.agents().get_agent("writer").unwrap().name, "Writer");
    }
}
