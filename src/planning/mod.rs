//! Chain-of-thought planning
//!
//! A plan is generated from one model call, stored on the session, approved
//! by the user and then executed step by step. Status moves
//! `awaiting_approval -> executing -> completed | failed`; the first failing
//! step stops the run and leaves later steps pending.
//!
//! Every mutation rewrites the whole plan into session metadata. Two writers
//! working from the same snapshot lose updates; the last write wins.

mod classifier;
mod parser;
mod plan;

pub use classifier::{KeywordClassifier, PlanTrigger};
pub use parser::{parse_plan_reply, DraftPlan, DraftStep, PlanParse};
pub use plan::{Plan, PlanStatus, PlanStep, StepStatus};

use crate::agent::{build_planning_prompt, Agent, ExecutionEngine};
use crate::error::{EngineError, Result};
use crate::message::{to_request_messages, user_message, Replay};
use crate::provider::bind;
use crate::session::Session;
use crate::tool::{ToolContext, ToolOutcome};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

const UNKNOWN_TOOL_NOTE: &str = " (tool not found, will handle manually)";

/// Result of one `execute_plan` pass
#[derive(Debug, Clone, Serialize)]
pub struct PlanRun {
    pub plan_status: PlanStatus,
    /// Results of the steps executed in this pass, in order
    pub step_results: Vec<Value>,
}

#[derive(Clone)]
pub struct PlanningEngine {
    engine: ExecutionEngine,
    trigger: Arc<dyn PlanTrigger>,
}

impl PlanningEngine {
    pub fn new(engine: ExecutionEngine, trigger: Arc<dyn PlanTrigger>) -> Self {
        Self { engine, trigger }
    }

    /// Advisory gate; callers decide whether to plan at all
    pub fn should_use_planning(&self, agent: &Agent, message: &str) -> bool {
        self.trigger.should_plan(agent, message)
    }

    /// Ask the model for a plan over the agent's allowed tools
    pub async fn generate_plan(
        &self,
        agent: &Agent,
        message: &str,
        context: Option<&str>,
    ) -> Result<Plan> {
        let tools = self.engine.resolver().resolve(agent);
        let system_prompt = build_planning_prompt(self.engine.templates(), &tools, context)?;

        let mut messages = to_request_messages(&system_prompt, &[], Replay::ChatOnly);
        messages.extend(user_message(message));

        let bound = bind(self.engine.model().clone(), Vec::new()).with_model(agent.model_name.clone());
        let reply = bound.invoke(&messages).await?;

        let parsed = parse_plan_reply(&reply.content);
        match &parsed {
            PlanParse::Direct(_) => debug!("Plan parsed directly"),
            PlanParse::Fenced(_) => debug!("Plan parsed from fenced block"),
            PlanParse::EmptyFallback { reason } => {
                warn!(agent = %agent.name, reason = %reason, "Model plan unreadable, using empty plan")
            }
        }
        let draft = parsed.into_draft().unwrap_or_default();
        Ok(self.build_plan(draft, message))
    }

    /// Apply defaults, make step ids unique and null out tool ids the
    /// registry does not know
    fn build_plan(&self, draft: DraftPlan, message: &str) -> Plan {
        let registry = self.engine.resolver().registry();
        let mut seen = HashSet::new();
        let steps = draft
            .steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| {
                let mut description = step.description.unwrap_or_default();
                let tool_id = match step.tool_id.filter(|t| !t.is_empty()) {
                    Some(tool_id) if registry.get_tool(&tool_id).is_none() => {
                        debug!(tool_id = %tool_id, "Plan names an unknown tool");
                        description.push_str(UNKNOWN_TOOL_NOTE);
                        None
                    }
                    other => other,
                };
                let mut id = step
                    .id
                    .filter(|id| !id.is_empty() && !seen.contains(id))
                    .unwrap_or_else(|| format!("step-{}", i + 1));
                while seen.contains(&id) {
                    id = format!("{}-{}", id, i + 1);
                }
                seen.insert(id.clone());
                PlanStep {
                    id,
                    description,
                    tool_id,
                    args: step.args.unwrap_or_else(|| json!({})),
                    status: StepStatus::Pending,
                    result: None,
                }
            })
            .collect();
        Plan::new(draft.goal.unwrap_or_else(|| message.to_string()), steps)
    }

    pub fn store_plan(&self, session_id: &str, plan: &Plan) -> Result<()> {
        self.engine.sessions().store_plan(session_id, plan)
    }

    pub fn get_plan(&self, session_id: &str) -> Result<Option<Plan>> {
        self.engine.sessions().get_plan(session_id)
    }

    fn require_plan(&self, session_id: &str) -> Result<Plan> {
        self.get_plan(session_id)?.ok_or(EngineError::NoPlan)
    }

    pub fn approve_plan(&self, session_id: &str) -> Result<Plan> {
        let mut plan = self.require_plan(session_id)?;
        if plan.status != PlanStatus::AwaitingApproval {
            return Err(EngineError::transition(format!(
                "Plan is not awaiting approval (status: {})",
                plan.status
            )));
        }
        plan.status = PlanStatus::Executing;
        plan.touch();
        self.store_plan(session_id, &plan)?;
        info!(session_id = %session_id, steps = plan.steps.len(), "Plan approved");
        Ok(plan)
    }

    /// Run every pending step in order, stopping at the first failure
    pub async fn execute_plan(&self, agent: &Agent, session_id: &str) -> Result<PlanRun> {
        let session = self.engine.sessions().get(session_id)?;
        let mut plan = self.require_plan(session_id)?;
        if plan.status != PlanStatus::Executing {
            return Err(EngineError::transition(format!(
                "Plan is not in executing state (status: {})",
                plan.status
            )));
        }

        let ctx = ToolContext::new(
            self.engine.store().clone(),
            session.workspace_id.clone(),
            session.user_id.clone(),
        );

        let mut step_results = Vec::new();
        for index in plan.pending_steps() {
            let step_id = plan.steps[index].id.clone();
            let result = self
                .execute_step(agent, &session, &ctx, &mut plan, index)
                .await?;
            let succeeded = result
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            step_results.push(result);

            if !succeeded {
                warn!(session_id = %session_id, step_id = %step_id, "Plan step failed");
                plan.status = PlanStatus::Failed;
                plan.touch();
                self.store_plan(session_id, &plan)?;
                return Ok(PlanRun {
                    plan_status: plan.status,
                    step_results,
                });
            }
        }

        plan.status = PlanStatus::Completed;
        plan.touch();
        self.store_plan(session_id, &plan)?;
        info!(session_id = %session_id, steps = step_results.len(), "Plan completed");
        Ok(PlanRun {
            plan_status: plan.status,
            step_results,
        })
    }

    async fn execute_step(
        &self,
        agent: &Agent,
        session: &Session,
        ctx: &ToolContext,
        plan: &mut Plan,
        index: usize,
    ) -> Result<Value> {
        let (step_id, tool_id, args) = {
            let step = plan
                .steps
                .get_mut(index)
                .ok_or_else(|| EngineError::not_found("step", index.to_string()))?;
            step.status = StepStatus::InProgress;
            (step.id.clone(), step.tool_id.clone(), step.args.clone())
        };
        let step_id = step_id.as_str();
        plan.touch();
        self.store_plan(&session.id, plan)?;

        let Some(tool_id) = tool_id else {
            let result = json!({"success": true, "message": "Informational step completed"});
            self.finish_step(session, plan, index, StepStatus::Completed, &result)?;
            return Ok(result);
        };

        let outcome = if !self.engine.resolver().can_execute(agent, &tool_id) {
            ToolOutcome::failure(format!("Permission denied for tool '{}'", tool_id))
        } else {
            match self.engine.resolver().registry().get_tool(&tool_id) {
                Some(tool) => tool.invoke(ctx, args.clone()).await,
                None => ToolOutcome::failure(format!("Tool '{}' not found", tool_id)),
            }
        };
        let status = if outcome.is_success() {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        let result = outcome.to_value();
        debug!(step_id = %step_id, tool_id = %tool_id, status = %status, "Plan step finished");

        self.finish_step(session, plan, index, status, &result)?;
        self.engine
            .record_tool_call(&session.id, &tool_id, &args, step_id, &result, Some(step_id))?;
        Ok(result)
    }

    fn finish_step(
        &self,
        session: &Session,
        plan: &mut Plan,
        index: usize,
        status: StepStatus,
        result: &Value,
    ) -> Result<()> {
        if let Some(step) = plan.steps.get_mut(index) {
            step.finish(status, result.clone());
        }
        plan.touch();
        self.store_plan(&session.id, plan)
    }

    /// Mark a pending step as skipped
    pub fn skip_step(&self, session_id: &str, step_id: &str) -> Result<PlanStep> {
        let mut plan = self.require_plan(session_id)?;
        let step = plan
            .step_mut(step_id)
            .ok_or_else(|| EngineError::Invalid(format!("Step '{}' not found in plan", step_id)))?;
        if step.status != StepStatus::Pending {
            return Err(EngineError::transition(format!(
                "Step '{}' is not pending (status: {})",
                step_id, step.status
            )));
        }
        step.skip();
        let skipped = step.clone();
        plan.touch();
        self.store_plan(session_id, &plan)?;
        Ok(skipped)
    }
}
