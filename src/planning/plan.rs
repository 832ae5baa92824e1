//! Plan and step types

use crate::session::now_timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    AwaitingApproval,
    Executing,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::AwaitingApproval => "awaiting_approval",
            PlanStatus::Executing => "executing",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    /// Tool to run; `None` for informational steps
    pub tool_id: Option<String>,
    #[serde(default = "empty_args")]
    pub args: Value,
    pub status: StepStatus,
    #[serde(default)]
    pub result: Option<Value>,
}

fn empty_args() -> Value {
    Value::Object(Map::new())
}

impl PlanStep {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            tool_id: None,
            args: empty_args(),
            status: StepStatus::Pending,
            result: None,
        }
    }

    pub fn with_tool(mut self, tool_id: impl Into<String>, args: Value) -> Self {
        self.tool_id = Some(tool_id.into());
        self.args = args;
        self
    }

    /// Whether the stored result reports success
    pub fn succeeded(&self) -> bool {
        self.result
            .as_ref()
            .and_then(|r| r.get("success"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub(crate) fn finish(&mut self, status: StepStatus, result: Value) {
        self.status = status;
        self.result = Some(result);
    }

    pub(crate) fn skip(&mut self) {
        self.finish(
            StepStatus::Skipped,
            json!({"success": true, "message": "Step skipped by user"}),
        );
    }
}

/// A goal decomposed into ordered, individually executable steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub status: PlanStatus,
    pub steps: Vec<PlanStep>,
    pub created_at: String,
    pub updated_at: String,
}

impl Plan {
    /// Fresh plan awaiting approval
    pub fn new(goal: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        let now = now_timestamp();
        Self {
            goal: goal.into(),
            status: PlanStatus::AwaitingApproval,
            steps,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut PlanStep> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }

    /// Positions of the pending steps, in stored order
    pub fn pending_steps(&self) -> Vec<usize> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status == StepStatus::Pending)
            .map(|(i, _)| i)
            .collect()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = now_timestamp();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let plan = Plan::new(
            "Ship it",
            vec![PlanStep::new("step-1", "Create pyramid")
                .with_tool("pyramids.create", json!({"title": "Q3"}))],
        );
        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(value["status"], "awaiting_approval");
        assert_eq!(value["steps"][0]["status"], "pending");
        assert_eq!(value["steps"][0]["tool_id"], "pyramids.create");
        assert_eq!(value["steps"][0]["result"], Value::Null);

        let back: Plan = serde_json::from_value(value).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn test_skip_and_success() {
        let mut step = PlanStep::new("step-2", "Review");
        assert!(!step.succeeded());
        step.skip();
        assert_eq!(step.status, StepStatus::Skipped);
        assert!(step.succeeded());
        assert_eq!(StepStatus::InProgress.to_string(), "in_progress");
    }
}
