//! Permission resolver
//!
//! Maps an agent's grants onto the concrete tool set it may invoke.
//! Stateless: resolve again whenever the agent profile changes.

use super::config::Agent;
use crate::tool::{AppDefinition, ToolAction, ToolDefinition, ToolRegistry};
use std::sync::Arc;

/// An app visible to an agent together with the actions it may use there
#[derive(Debug, Clone)]
pub struct AppAccess<'a> {
    pub app: &'a AppDefinition,
    pub actions: Vec<ToolAction>,
}

#[derive(Clone)]
pub struct PermissionResolver {
    registry: Arc<ToolRegistry>,
}

impl PermissionResolver {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Manager agents without grants are unrestricted
    fn is_unrestricted(agent: &Agent) -> bool {
        agent.is_manager() && agent.app_access.is_empty()
    }

    /// Every tool the agent may call
    pub fn resolve(&self, agent: &Agent) -> Vec<ToolDefinition> {
        if Self::is_unrestricted(agent) {
            return self.registry.list_tools().into_iter().cloned().collect();
        }

        let mut allowed: Vec<ToolDefinition> = Vec::new();
        for grant in &agent.app_access {
            for tool in self.registry.tools_for_app(&grant.app_id) {
                if grant.allows(tool.action) && !allowed.iter().any(|t| t.tool_id == tool.tool_id) {
                    allowed.push(tool.clone());
                }
            }
        }
        allowed
    }

    pub fn can_execute(&self, agent: &Agent, tool_id: &str) -> bool {
        self.resolve(agent).iter().any(|t| t.tool_id == tool_id)
    }

    /// Apps the agent can see, with its permitted actions per app
    pub fn app_definitions(&self, agent: &Agent) -> Vec<AppAccess<'_>> {
        if Self::is_unrestricted(agent) {
            return self
                .registry
                .list_apps()
                .into_iter()
                .map(|app| AppAccess {
                    app,
                    actions: app.available_actions(),
                })
                .collect();
        }

        let mut seen: Vec<&str> = Vec::new();
        let mut apps = Vec::new();
        for grant in &agent.app_access {
            if seen.contains(&grant.app_id.as_str()) {
                continue;
            }
            seen.push(grant.app_id.as_str());
            if let Some(app) = self.registry.get_app(&grant.app_id) {
                let permitted = agent.permitted_actions(&grant.app_id);
                let actions = app
                    .available_actions()
                    .into_iter()
                    .filter(|a| permitted.contains(a))
                    .collect();
                apps.push(AppAccess { app, actions });
            }
        }
        apps
    }
}
