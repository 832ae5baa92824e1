//! Execution loop engine
//!
//! Runs one agent turn over a session transcript:
//! 1. Resolve the agent's tools and bind them to the model
//! 2. Replay the transcript behind a system prompt describing the agent's apps
//! 3. Call the model; execute any requested tools; repeat
//!
//! The loop stops on the first text-only reply or after
//! `MAX_TOOL_ITERATIONS` model calls. Every tool call and its result is
//! written to the session as it happens.

use super::config::Agent;
use super::permissions::PermissionResolver;
use super::prompt::{build_chat_prompt, build_system_prompt};
use crate::error::Result;
use crate::events::{
    emit, EngineEvent, EventSender, ExecutionOutcome, ToolCallTrace, TurnCompleteReason,
};
use crate::message::{
    to_request_messages, tool_call_message, tool_result_message, MessageRole, Replay,
    ToolCallRecord,
};
use crate::provider::{bind, BoundModel, LanguageModel, ModelToolCall};
use crate::session::{Session, SessionService};
use crate::store::{DocumentStore, Fields};
use crate::templates::Templates;
use crate::tool::{to_openai_tools, ToolContext, ToolDefinition, ToolOutcome};
use async_openai::types::ChatCompletionRequestMessage;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Upper bound on model calls per turn
pub const MAX_TOOL_ITERATIONS: usize = 10;

pub const MAX_ITERATIONS_RESPONSE: &str =
    "I've reached the maximum number of tool calls for this turn.";

/// Shared engine; cheap to clone
#[derive(Clone)]
pub struct ExecutionEngine {
    resolver: PermissionResolver,
    sessions: SessionService,
    store: Arc<dyn DocumentStore>,
    model: Arc<dyn LanguageModel>,
    templates: Arc<Templates>,
    events: Option<EventSender>,
}

impl ExecutionEngine {
    pub fn new(
        resolver: PermissionResolver,
        sessions: SessionService,
        store: Arc<dyn DocumentStore>,
        model: Arc<dyn LanguageModel>,
        templates: Arc<Templates>,
    ) -> Self {
        Self {
            resolver,
            sessions,
            store,
            model,
            templates,
            events: None,
        }
    }

    /// Stream `EngineEvent`s to a listener
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    pub fn templates(&self) -> &Arc<Templates> {
        &self.templates
    }

    pub fn events(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }

    /// Whether the agent would get any tools bound
    pub fn has_tools(&self, agent: &Agent) -> bool {
        !self.resolver.resolve(agent).is_empty()
    }

    fn tool_context(&self, session: &Session) -> ToolContext {
        ToolContext::new(
            self.store.clone(),
            session.workspace_id.clone(),
            session.user_id.clone(),
        )
    }

    /// Run a tool-using turn. The user's message must already be on the
    /// session transcript.
    pub async fn execute(
        &self,
        agent: &Agent,
        session_id: &str,
        context: Option<&str>,
    ) -> Result<ExecutionOutcome> {
        self.execute_with(agent, session_id, context, Vec::new())
            .await
    }

    /// Like `execute`, with per-turn tools added to the agent's allowed set
    pub async fn execute_with(
        &self,
        agent: &Agent,
        session_id: &str,
        context: Option<&str>,
        extra_tools: Vec<ToolDefinition>,
    ) -> Result<ExecutionOutcome> {
        let session = self.sessions.get(session_id)?;

        let mut allowed = extra_tools;
        for tool in self.resolver.resolve(agent) {
            if !allowed.iter().any(|t| t.tool_id == tool.tool_id) {
                allowed.push(tool);
            }
        }

        let apps = self.resolver.app_definitions(agent);
        let system_prompt = build_system_prompt(&self.templates, agent, &apps, context)?;
        let mut messages = to_request_messages(&system_prompt, &session.messages, Replay::Full);

        let bound = bind(self.model.clone(), to_openai_tools(&allowed))
            .with_model(agent.model_name.clone());
        let model_name = bound.model_name();
        let ctx = self.tool_context(&session);

        info!(
            agent = %agent.name,
            session_id = %session_id,
            tools = allowed.len(),
            model = %model_name,
            "Starting execution"
        );
        emit(
            self.events.as_ref(),
            EngineEvent::TurnStart {
                agent: agent.name.clone(),
                session_id: session_id.to_string(),
            },
        );

        let mut traces = Vec::new();
        for iteration in 0..MAX_TOOL_ITERATIONS {
            let reply = bound.invoke(&messages).await?;

            if !reply.has_tool_calls() {
                debug!(iteration, "Model answered with text");
                return Ok(self.finish(
                    agent,
                    reply.content,
                    model_name,
                    traces,
                    TurnCompleteReason::TextResponse,
                ));
            }

            let calls: Vec<ModelToolCall> = reply
                .tool_calls
                .into_iter()
                .map(|mut call| {
                    if call.id.is_empty() {
                        call.id = uuid::Uuid::new_v4().to_string();
                    }
                    call
                })
                .collect();

            let records: Vec<ToolCallRecord> = calls
                .iter()
                .map(|c| ToolCallRecord::new(&c.name, c.args.clone(), &c.id))
                .collect();
            messages.extend(tool_call_message(&records));

            for call in calls {
                let result = self
                    .run_tool_call(agent, session_id, &ctx, &allowed, &call, &mut messages)
                    .await?;
                traces.push(ToolCallTrace {
                    tool_id: call.name,
                    args: call.args,
                    result,
                });
            }
        }

        warn!(
            agent = %agent.name,
            session_id = %session_id,
            tool_calls = traces.len(),
            "Reached maximum tool iterations"
        );
        Ok(self.finish(
            agent,
            MAX_ITERATIONS_RESPONSE.to_string(),
            model_name,
            traces,
            TurnCompleteReason::MaxIterations,
        ))
    }

    /// Check, dispatch and persist one requested tool call; returns the
    /// result as stored
    async fn run_tool_call(
        &self,
        agent: &Agent,
        session_id: &str,
        ctx: &ToolContext,
        allowed: &[ToolDefinition],
        call: &ModelToolCall,
        messages: &mut Vec<ChatCompletionRequestMessage>,
    ) -> Result<Value> {
        emit(
            self.events.as_ref(),
            EngineEvent::ToolCallStart {
                agent: agent.name.clone(),
                call_id: call.id.clone(),
                tool: call.name.clone(),
                arguments: call.args.clone(),
            },
        );
        let start = Instant::now();

        let outcome = dispatch(ctx, allowed, self.resolver.registry().get_tool(&call.name), call).await;
        let result = outcome.to_value();

        debug!(
            tool_id = %call.name,
            success = outcome.success,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tool call finished"
        );
        emit(
            self.events.as_ref(),
            EngineEvent::ToolCallEnd {
                agent: agent.name.clone(),
                call_id: call.id.clone(),
                tool: call.name.clone(),
                success: outcome.success,
                duration_ms: start.elapsed().as_millis() as u64,
            },
        );

        self.record_tool_call(session_id, &call.name, &call.args, &call.id, &result, None)?;
        messages.extend(tool_result_message(&call.id, &result.to_string()));
        Ok(result)
    }

    /// Persist a `tool_call` / `tool_result` pair on the transcript
    pub fn record_tool_call(
        &self,
        session_id: &str,
        tool_id: &str,
        args: &Value,
        call_id: &str,
        result: &Value,
        plan_step: Option<&str>,
    ) -> Result<()> {
        let mut call_meta = Fields::new();
        call_meta.insert("tool_id".to_string(), json!(tool_id));
        let mut result_meta = call_meta.clone();
        result_meta.insert("call_id".to_string(), json!(call_id));
        if let Some(step) = plan_step {
            call_meta.insert("plan_step".to_string(), json!(step));
            result_meta.insert("plan_step".to_string(), json!(step));
        }

        self.sessions.add_message(
            session_id,
            MessageRole::ToolCall,
            ToolCallRecord::new(tool_id, args.clone(), call_id).to_json(),
            call_meta,
        )?;
        self.sessions.add_message(
            session_id,
            MessageRole::ToolResult,
            result.to_string(),
            result_meta,
        )?;
        Ok(())
    }

    fn finish(
        &self,
        agent: &Agent,
        response: String,
        model: String,
        tool_calls: Vec<ToolCallTrace>,
        reason: TurnCompleteReason,
    ) -> ExecutionOutcome {
        emit(
            self.events.as_ref(),
            EngineEvent::TurnComplete {
                agent: agent.name.clone(),
                reason,
            },
        );
        ExecutionOutcome {
            response,
            model,
            tool_calls,
            reason,
        }
    }

    /// Tool-less turn: agent context plus the user/assistant history. The
    /// user's message must already be on the session transcript.
    pub async fn chat(
        &self,
        agent: &Agent,
        session_id: &str,
        context: Option<&str>,
    ) -> Result<ExecutionOutcome> {
        let session = self.sessions.get(session_id)?;
        let system_prompt = build_chat_prompt(agent, context);
        let messages = to_request_messages(&system_prompt, &session.messages, Replay::ChatOnly);

        let bound: BoundModel = bind(self.model.clone(), Vec::new()).with_model(agent.model_name.clone());
        let reply = bound.invoke(&messages).await?;
        Ok(ExecutionOutcome {
            response: reply.content,
            model: bound.model_name(),
            tool_calls: Vec::new(),
            reason: TurnCompleteReason::TextResponse,
        })
    }
}

/// Permission check, lookup and invocation. Per-turn tools shadow the registry.
async fn dispatch(
    ctx: &ToolContext,
    allowed: &[ToolDefinition],
    registered: Option<&ToolDefinition>,
    call: &ModelToolCall,
) -> ToolOutcome {
    if !allowed.iter().any(|t| t.tool_id == call.name) {
        return ToolOutcome::failure(format!("Permission denied for tool '{}'", call.name));
    }

    let tool = allowed
        .iter()
        .find(|t| t.tool_id == call.name)
        .or(registered);
    match tool {
        Some(tool) => tool.invoke(ctx, call.args.clone()).await,
        None => ToolOutcome::failure(format!("Tool '{}' not found", call.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ModelReply, ScriptedModel};
    use crate::session::NewSession;
    use crate::store::MemoryStore;
    use crate::tool::{handler_fn, ToolAction, ToolRegistry};
    use crate::tools::register_catalog;

    struct Fixture {
        engine: ExecutionEngine,
        store: Arc<MemoryStore>,
        session_id: String,
    }

    fn fixture(model: ScriptedModel) -> (Fixture, Arc<ScriptedModel>) {
        let store = Arc::new(MemoryStore::new());
        let mut registry = ToolRegistry::new();
        register_catalog(&mut registry).unwrap();

        let model = Arc::new(model);
        let sessions = SessionService::new(store.clone());
        let engine = ExecutionEngine::new(
            PermissionResolver::new(registry.into_shared()),
            sessions.clone(),
            store.clone(),
            model.clone(),
            Templates::new().unwrap(),
        );
        let session = sessions
            .create(NewSession {
                workspace_id: "ws-1".to_string(),
                agent_id: "agent-1".to_string(),
                user_id: "user-1".to_string(),
                ..Default::default()
            })
            .unwrap();
        (
            Fixture {
                engine,
                store,
                session_id: session.id,
            },
            model,
        )
    }

    fn pyramid_agent() -> Agent {
        Agent::new("agent-1", "ws-1", "Pyramid Bot")
            .with_context("You manage pyramids.")
            .with_grant("pyramids", &[ToolAction::Create, ToolAction::Read, ToolAction::List])
    }

    fn say(fx: &Fixture, text: &str) {
        fx.engine
            .sessions()
            .add_message(&fx.session_id, MessageRole::User, text, Fields::new())
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_pyramid_end_to_end() {
        let (fx, model) = fixture(
            ScriptedModel::new()
                .with_reply(ModelReply::tool_call(
                    "call_1",
                    "pyramids.create",
                    json!({"title": "Q3 Strategy"}),
                ))
                .with_text("Created the Q3 Strategy pyramid."),
        );
        say(&fx, "Create a pyramid called Q3 Strategy");

        let outcome = fx
            .engine
            .execute(&pyramid_agent(), &fx.session_id, None)
            .await
            .unwrap();

        assert_eq!(outcome.response, "Created the Q3 Strategy pyramid.");
        assert_eq!(outcome.reason, TurnCompleteReason::TextResponse);
        assert_eq!(outcome.model, "scripted");
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.tool_calls[0].result["success"], true);
        assert_eq!(fx.store.count("pyramids"), 1);

        let transcript = fx.engine.sessions().get(&fx.session_id).unwrap().messages;
        let roles: Vec<MessageRole> = transcript.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::User, MessageRole::ToolCall, MessageRole::ToolResult]
        );
        let record: ToolCallRecord = serde_json::from_str(&transcript[1].content).unwrap();
        assert_eq!(record.tool_id, "pyramids.create");
        assert_eq!(record.call_id, "call_1");
        assert_eq!(transcript[2].metadata_str("call_id"), Some("call_1"));

        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].tool_names,
            vec!["pyramids.create", "pyramids.read", "pyramids.list"]
        );
        // second call sees system, user, assistant tool call, tool result
        assert_eq!(requests[1].messages.len(), 4);
    }

    #[tokio::test]
    async fn test_stops_after_max_iterations() {
        let (fx, model) = fixture(
            ScriptedModel::new().repeating(ModelReply::tool_call("c", "pyramids.list", json!({}))),
        );
        say(&fx, "List forever");

        let outcome = fx
            .engine
            .execute(&pyramid_agent(), &fx.session_id, None)
            .await
            .unwrap();

        assert_eq!(outcome.response, MAX_ITERATIONS_RESPONSE);
        assert!(outcome.hit_iteration_limit());
        assert_eq!(outcome.tool_calls.len(), MAX_TOOL_ITERATIONS);
        assert_eq!(model.call_count(), MAX_TOOL_ITERATIONS);

        let transcript = fx.engine.sessions().get(&fx.session_id).unwrap().messages;
        assert_eq!(transcript.len(), 1 + 2 * MAX_TOOL_ITERATIONS);
    }

    #[tokio::test]
    async fn test_denied_tool_is_not_invoked() {
        let (fx, _model) = fixture(
            ScriptedModel::new()
                .with_reply(ModelReply::tool_call("c1", "pyramids.delete", json!({"id": "p1"})))
                .with_reply(ModelReply::tool_call("c2", "pyramids.explode", json!({})))
                .with_text("I can't do that."),
        );
        say(&fx, "Delete p1");

        let outcome = fx
            .engine
            .execute(&pyramid_agent(), &fx.session_id, None)
            .await
            .unwrap();

        assert_eq!(
            outcome.tool_calls[0].result,
            json!({"success": false, "error": "Permission denied for tool 'pyramids.delete'"})
        );
        assert_eq!(
            outcome.tool_calls[1].result["error"],
            "Permission denied for tool 'pyramids.explode'"
        );
        assert_eq!(outcome.response, "I can't do that.");

        let transcript = fx.engine.sessions().get(&fx.session_id).unwrap().messages;
        assert_eq!(transcript.len(), 5);
    }

    #[tokio::test]
    async fn test_handler_fault_becomes_failure() {
        let (fx, _model) = fixture(
            ScriptedModel::new()
                .with_reply(ModelReply::tool_call("c1", "pyramids.read", json!({"id": "missing"})))
                .with_text("Not found."),
        );
        say(&fx, "Read missing");

        let outcome = fx
            .engine
            .execute(&pyramid_agent(), &fx.session_id, None)
            .await
            .unwrap();
        assert_eq!(outcome.tool_calls[0].result["success"], false);
        assert_eq!(outcome.response, "Not found.");
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let (fx, _model) = fixture(ScriptedModel::new().failing("upstream down"));
        say(&fx, "hello");

        let err = fx
            .engine
            .execute(&pyramid_agent(), &fx.session_id, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "LLM_ERROR");
    }

    #[tokio::test]
    async fn test_transcript_is_replayed() {
        let (fx, model) = fixture(ScriptedModel::new().with_text("ok"));
        say(&fx, "first");
        fx.engine
            .record_tool_call(
                &fx.session_id,
                "pyramids.list",
                &json!({}),
                "old_call",
                &json!({"success": true, "count": 0}),
                None,
            )
            .unwrap();
        fx.engine
            .sessions()
            .add_message(&fx.session_id, MessageRole::Assistant, "none yet", Fields::new())
            .unwrap();
        say(&fx, "second");

        fx.engine
            .execute(&pyramid_agent(), &fx.session_id, Some("Sprint 4"))
            .await
            .unwrap();

        let request = &model.requests()[0];
        // system, user, tool call, tool result, assistant, user
        assert_eq!(request.messages.len(), 6);
        match &request.messages[0] {
            ChatCompletionRequestMessage::System(_) => {}
            other => panic!("expected system prompt, got {:?}", other),
        }
        match &request.messages[3] {
            ChatCompletionRequestMessage::Tool(t) => assert_eq!(t.tool_call_id, "old_call"),
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_extra_tools_are_callable() {
        let (fx, _model) = fixture(
            ScriptedModel::new()
                .with_reply(ModelReply::tool_call("c1", "orchestration.delegate", json!({"task": "x"})))
                .with_text("done"),
        );
        say(&fx, "delegate");

        let extra = ToolDefinition::new(
            "orchestration",
            ToolAction::Create,
            "Delegate",
            "",
            json!({}),
            handler_fn(|_ctx, _args| async move { Ok(ToolOutcome::success(json!({"delegated": true}))) }),
        )
        .with_id("orchestration.delegate");

        let agent = Agent::new("agent-1", "ws-1", "Plain");
        let outcome = fx
            .engine
            .execute_with(&agent, &fx.session_id, None, vec![extra])
            .await
            .unwrap();
        assert_eq!(outcome.tool_calls[0].result["delegated"], true);
    }

    #[tokio::test]
    async fn test_plain_chat_skips_tool_traffic() {
        let (fx, model) = fixture(ScriptedModel::new().with_text("Hi!"));
        say(&fx, "hello");
        fx.engine
            .record_tool_call(&fx.session_id, "pyramids.list", &json!({}), "c", &json!({"success": true}), None)
            .unwrap();

        let agent = Agent::new("agent-1", "ws-1", "Chatty")
            .with_context("Be brief.")
            .with_model("gpt-4o-mini");
        let outcome = fx.engine.chat(&agent, &fx.session_id, None).await.unwrap();

        assert_eq!(outcome.response, "Hi!");
        assert_eq!(outcome.model, "gpt-4o-mini");
        let request = &model.requests()[0];
        assert!(request.tool_names.is_empty());
        assert_eq!(request.messages.len(), 2);
    }

    #[test]
    fn test_has_tools() {
        let (fx, _model) = fixture(ScriptedModel::new());
        assert!(fx.engine.has_tools(&pyramid_agent()));
        assert!(!fx.engine.has_tools(&Agent::new("a", "ws-1", "None")));
    }
}
