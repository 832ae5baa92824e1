//! Agent-to-agent delegation
//!
//! An orchestrator hands a task to another agent by opening a child session
//! for it, running that agent to completion and recording a trace on the
//! parent session. Nesting is bounded by the length of the parent's session
//! ancestry, never by a caller-supplied counter.

use crate::agent::{Agent, AgentDirectory, ExecutionEngine};
use crate::error::Result;
use crate::events::{emit, EngineEvent, ToolCallTrace};
use crate::message::MessageRole;
use crate::session::{NewSession, SessionStatus};
use crate::store::{fields_from, Fields};
use crate::tool::{ToolAction, ToolContext, ToolDefinition, ToolHandler, ToolOutcome};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub const MAX_DELEGATION_DEPTH: usize = 3;

pub const DELEGATE_APP_ID: &str = "orchestration";
pub const DELEGATE_TOOL_ID: &str = "orchestration.delegate";

const RESPONSE_PREVIEW_CHARS: usize = 200;

/// Outcome of one delegation
#[derive(Debug, Clone, Serialize)]
pub struct DelegationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub agent_id: String,
    pub agent_name: String,
    /// Child session; absent when nothing was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallTrace>,
}

impl DelegationResult {
    fn rejected(target: &Agent, error: &str) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            agent_id: target.id.clone(),
            agent_name: target.name.clone(),
            session_id: None,
            response: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn to_outcome(&self) -> ToolOutcome {
        serde_json::to_value(self)
            .map(|v| ToolOutcome::from_value(&v))
            .unwrap_or_else(|e| ToolOutcome::failure(e.to_string()))
    }
}

pub struct Orchestrator {
    engine: ExecutionEngine,
    agents: AgentDirectory,
}

impl Orchestrator {
    pub fn new(engine: ExecutionEngine, agents: AgentDirectory) -> Arc<Self> {
        Arc::new(Self { engine, agents })
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Specialist agents of a workspace covering the given apps (and, when
    /// given, the given actions on each of those apps)
    pub fn find_candidates(
        &self,
        workspace_id: &str,
        required_app_ids: &[String],
        required_permissions: &[ToolAction],
    ) -> Result<Vec<Agent>> {
        let candidates = self
            .agents
            .list_agents(workspace_id)?
            .into_iter()
            .filter(|agent| !agent.is_orchestrating() && !agent.app_access.is_empty())
            .filter(|agent| {
                let granted = agent.granted_app_ids();
                required_app_ids
                    .iter()
                    .all(|app| granted.contains(&app.as_str()))
            })
            .filter(|agent| {
                required_app_ids.is_empty()
                    || required_permissions.is_empty()
                    || required_app_ids.iter().all(|app| {
                        let permitted = agent.permitted_actions(app);
                        required_permissions.iter().all(|p| permitted.contains(p))
                    })
            })
            .collect();
        Ok(candidates)
    }

    /// Per-turn tools for an agent running in `session_id`
    pub fn tools_for(self: &Arc<Self>, agent: &Agent, session_id: &str) -> Vec<ToolDefinition> {
        if agent.can_delegate() {
            vec![self.delegate_tool(session_id)]
        } else {
            Vec::new()
        }
    }

    /// The delegation tool bound to a parent session
    pub fn delegate_tool(self: &Arc<Self>, parent_session_id: &str) -> ToolDefinition {
        let parameters = serde_json::to_value(schemars::schema_for!(DelegateArgs))
            .unwrap_or_else(|_| json!({"type": "object", "properties": {}}));
        ToolDefinition::new(
            DELEGATE_APP_ID,
            ToolAction::Create,
            "Delegate Task",
            "Hand a task to another agent. Give either agent_id, or app_ids to pick \
             the first agent with access to all of those apps.",
            parameters,
            Arc::new(DelegateTool {
                orchestrator: self.clone(),
                parent_session_id: parent_session_id.to_string(),
            }),
        )
        .with_id(DELEGATE_TOOL_ID)
    }

    /// Run `task` as `target` in a new child session of `parent_session_id`
    pub async fn delegate(
        self: &Arc<Self>,
        parent_session_id: &str,
        target: &Agent,
        task: &str,
        context: Option<&str>,
    ) -> Result<DelegationResult> {
        let sessions = self.engine.sessions();
        let depth = sessions.delegation_depth(parent_session_id)?;
        if depth >= MAX_DELEGATION_DEPTH {
            warn!(
                parent_session_id = %parent_session_id,
                agent_id = %target.id,
                depth,
                "Delegation depth exceeded"
            );
            return Ok(DelegationResult::rejected(target, "Maximum delegation depth reached"));
        }

        let parent = sessions.get(parent_session_id)?;
        if target.workspace_id != parent.workspace_id {
            warn!(
                parent_session_id = %parent_session_id,
                agent_id = %target.id,
                "Delegation target outside the session's workspace"
            );
            return Ok(DelegationResult::rejected(
                target,
                "Agent does not belong to this workspace",
            ));
        }
        let sub = sessions.create(NewSession {
            workspace_id: parent.workspace_id.clone(),
            agent_id: target.id.clone(),
            user_id: parent.user_id.clone(),
            title: None,
            parent_session_id: Some(parent_session_id.to_string()),
            chat_only: false,
        })?;
        info!(
            parent_session_id = %parent_session_id,
            sub_session_id = %sub.id,
            agent = %target.name,
            depth = depth + 1,
            "Delegating task"
        );
        emit(
            self.engine.events(),
            EngineEvent::DelegationStart {
                parent: parent.agent_id.clone(),
                delegate: target.name.clone(),
                sub_session_id: sub.id.clone(),
                task: task.to_string(),
            },
        );

        sessions.add_message(&sub.id, MessageRole::User, task, Fields::new())?;

        let outcome = if self.engine.has_tools(target) || target.can_delegate() {
            let extra = self.tools_for(target, &sub.id);
            self.engine
                .execute_with(target, &sub.id, context, extra)
                .await?
        } else {
            self.engine.chat(target, &sub.id, context).await?
        };

        sessions.add_message(&sub.id, MessageRole::Assistant, outcome.response.as_str(), Fields::new())?;
        sessions.update_status(&sub.id, SessionStatus::Completed)?;

        let preview: String = outcome.response.chars().take(RESPONSE_PREVIEW_CHARS).collect();
        let trace = json!({
            "success": true,
            "delegation": {
                "agent_id": target.id,
                "agent_name": target.name,
                "sub_session_id": sub.id,
                "task": task,
                "response_preview": preview,
                "tool_call_count": outcome.tool_calls.len(),
            },
            "response": outcome.response,
        });
        sessions.add_message(
            parent_session_id,
            MessageRole::ToolResult,
            trace.to_string(),
            fields_from(json!({ "type": "delegation", "agent_id": target.id })),
        )?;

        emit(
            self.engine.events(),
            EngineEvent::DelegationEnd {
                parent: parent.agent_id,
                delegate: target.name.clone(),
                sub_session_id: sub.id.clone(),
            },
        );

        Ok(DelegationResult {
            success: true,
            error: None,
            agent_id: target.id.clone(),
            agent_name: target.name.clone(),
            session_id: Some(sub.id),
            response: Some(outcome.response),
            tool_calls: outcome.tool_calls,
        })
    }
}

/// Arguments of the delegation tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DelegateArgs {
    /// The task for the other agent, stated completely
    #[serde(default)]
    pub task: String,
    /// Delegate to this agent directly
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Pick the first agent with access to all of these apps
    #[serde(default)]
    pub app_ids: Vec<String>,
    /// Extra context for the other agent
    #[serde(default)]
    pub context: Option<String>,
}

/// Delegation exposed as an ordinary tool handler
struct DelegateTool {
    orchestrator: Arc<Orchestrator>,
    parent_session_id: String,
}

#[async_trait]
impl ToolHandler for DelegateTool {
    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<ToolOutcome> {
        let args: DelegateArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => return Ok(ToolOutcome::failure(format!("Invalid arguments: {}", e))),
        };

        if args.task.trim().is_empty() {
            return Ok(ToolOutcome::failure("Missing task"));
        }

        let target = if let Some(agent_id) = args.agent_id.as_deref() {
            match self.orchestrator.agents.get_agent(agent_id) {
                Ok(agent) if agent.workspace_id == ctx.workspace_id => agent,
                _ => return Ok(ToolOutcome::failure(format!("Agent '{}' not found", agent_id))),
            }
        } else if !args.app_ids.is_empty() {
            let candidates =
                self.orchestrator
                    .find_candidates(&ctx.workspace_id, &args.app_ids, &[])?;
            match candidates.into_iter().next() {
                Some(agent) => agent,
                None => {
                    return Ok(ToolOutcome::failure(format!(
                        "No agents found with access to apps: {}",
                        args.app_ids.join(", ")
                    )))
                }
            }
        } else {
            return Ok(ToolOutcome::failure("Must provide either agent_id or app_ids"));
        };

        let result = self
            .orchestrator
            .delegate(
                &self.parent_session_id,
                &target,
                &args.task,
                args.context.as_deref(),
            )
            .await?;
        Ok(result.to_outcome())
    }
}
