//! Built-in agent definitions
//!
//! Every workspace starts with one manager agent that can answer directly or
//! hand work to the workspace's specialists.

use super::config::{Agent, OrchestratorPolicy};

pub const DEFAULT_MANAGER_NAME: &str = "Jeana";

const DEFAULT_MANAGER_CONTEXT: &str =
    "You are a helpful AI assistant. Answer questions clearly and concisely.";

/// The default manager agent for a workspace (no grants, so unrestricted)
pub fn default_manager(id: impl Into<String>, workspace_id: impl Into<String>) -> Agent {
    let mut agent = Agent::new(id, workspace_id, DEFAULT_MANAGER_NAME)
        .as_manager(OrchestratorPolicy::default())
        .with_context(DEFAULT_MANAGER_CONTEXT);
    agent.is_default = true;
    agent
}
