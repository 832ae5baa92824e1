//! Agent Platform - agent execution and orchestration engine
//!
//! This crate provides:
//! - A registry of permissioned app tools, local and remote (MCP)
//! - A bounded tool-calling loop over session transcripts
//! - Agent-to-agent delegation through child sessions
//! - Approvable multi-step plans
//! - CLI interface for driving all of the above against a local store

pub mod config;
pub mod error;
pub mod message;
pub mod platform;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod templates;

// Agent system
pub mod agent;
pub mod events;
pub mod mcp;
pub mod orchestration;
pub mod planning;
pub mod provider;
pub mod tool;
pub mod tools;

pub use config::Config;
pub use error::{EngineError, Result};
pub use platform::{MessageExchange, Platform};
pub use telemetry::{Telemetry, TurnRecord};

pub use agent::{Agent, AgentDirectory, ExecutionEngine, PermissionResolver, MAX_TOOL_ITERATIONS};
pub use events::{EngineEvent, EventSender, ExecutionOutcome, ToolCallTrace, TurnCompleteReason};
pub use orchestration::{Orchestrator, MAX_DELEGATION_DEPTH};
pub use planning::{Plan, PlanStatus, PlanStep, PlanningEngine, StepStatus};
pub use provider::{LanguageModel, ProviderClient, ProviderConfig, ScriptedModel};
pub use session::{NewSession, Session, SessionService, SessionStatus};
pub use store::{DocumentStore, MemoryStore, SqliteStore};
pub use tool::{AppDefinition, ToolAction, ToolDefinition, ToolHandler, ToolOutcome, ToolRegistry};
