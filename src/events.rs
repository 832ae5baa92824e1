//! Execution event types
//!
//! Events are emitted by the execution engine while a turn runs and are
//! consumed by output adapters (the CLI prints them). The turn's final
//! result is returned separately as an `ExecutionOutcome`.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// Events emitted during execution
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Turn started (entering the tool loop)
    TurnStart { agent: String, session_id: String },
    /// Tool call started
    ToolCallStart {
        agent: String,
        call_id: String,
        tool: String,
        arguments: Value,
    },
    /// Tool call completed
    ToolCallEnd {
        agent: String,
        call_id: String,
        tool: String,
        success: bool,
        duration_ms: u64,
    },
    /// Work handed to another agent in a child session
    DelegationStart {
        parent: String,
        delegate: String,
        sub_session_id: String,
        task: String,
    },
    DelegationEnd {
        parent: String,
        delegate: String,
        sub_session_id: String,
    },
    /// Turn completed (exiting the tool loop)
    TurnComplete {
        agent: String,
        reason: TurnCompleteReason,
    },
}

pub type EventSender = mpsc::UnboundedSender<EngineEvent>;

/// Reason the turn completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnCompleteReason {
    /// Model responded with text only (no tool calls)
    TextResponse,
    /// Tool-call budget exhausted
    MaxIterations,
}

/// A tool call that was executed during a turn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallTrace {
    pub tool_id: String,
    pub args: Value,
    pub result: Value,
}

/// Result of one execution turn
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub response: String,
    pub model: String,
    pub tool_calls: Vec<ToolCallTrace>,
    pub reason: TurnCompleteReason,
}

impl ExecutionOutcome {
    pub fn hit_iteration_limit(&self) -> bool {
        self.reason == TurnCompleteReason::MaxIterations
    }
}

/// Send an event if anyone is listening
pub fn emit(sender: Option<&EventSender>, event: EngineEvent) {
    if let Some(tx) = sender {
        let _ = tx.send(event);
    }
}
