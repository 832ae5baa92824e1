//! Agent profile types
//!
//! An agent is a capability profile: which apps it may touch and with which
//! actions, whether it orchestrates other agents, and the free-text context
//! that seeds its system prompt. Stored agents are attribute bags; they are
//! converted into `Agent` at the store boundary.

use crate::error::{EngineError, Result};
use crate::store::{Document, Fields};
use crate::tool::ToolAction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Agent type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Generic agent limited to its grants
    #[default]
    Custom,
    /// Manager ("general manager") agent; unrestricted when it has no grants
    Gm,
}

/// One `{app_id, permitted actions}` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppAccessGrant {
    pub app_id: String,
    #[serde(default)]
    pub permissions: Vec<ToolAction>,
}

impl AppAccessGrant {
    pub fn new(app_id: impl Into<String>, permissions: &[ToolAction]) -> Self {
        Self {
            app_id: app_id.into(),
            permissions: permissions.to_vec(),
        }
    }

    pub fn allows(&self, action: ToolAction) -> bool {
        self.permissions.contains(&action)
    }
}

/// How an orchestrator hands work to other agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorPolicy {
    #[serde(default = "default_true")]
    pub can_delegate_to_agents: bool,
    #[serde(default = "default_true")]
    pub auto_select_agent: bool,
    /// What to do when no agent fits; "handle_self" answers directly
    #[serde(default = "default_fallback")]
    pub fallback_behavior: String,
}

fn default_true() -> bool {
    true
}

fn default_fallback() -> String {
    "handle_self".to_string()
}

impl Default for OrchestratorPolicy {
    fn default() -> Self {
        Self {
            can_delegate_to_agents: true,
            auto_select_agent: true,
            fallback_behavior: default_fallback(),
        }
    }
}

/// Agent profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Document id (not stored inside the document body)
    #[serde(default, skip_serializing)]
    pub id: String,

    #[serde(default)]
    pub workspace_id: String,

    #[serde(default = "default_name")]
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: AgentKind,

    #[serde(default)]
    pub app_access: Vec<AppAccessGrant>,

    #[serde(default)]
    pub is_orchestrator: bool,

    /// The workspace's default agent; cannot be deleted
    #[serde(default)]
    pub is_default: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_config: Option<OrchestratorPolicy>,

    /// Free-text system context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Model override (provider default if None)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

fn default_name() -> String {
    "New Agent".to_string()
}

impl Agent {
    /// Create a custom agent with no grants
    pub fn new(
        id: impl Into<String>,
        workspace_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            name: name.into(),
            kind: AgentKind::Custom,
            app_access: Vec::new(),
            is_orchestrator: false,
            is_default: false,
            orchestrator_config: None,
            context: None,
            model_name: None,
        }
    }

    /// Turn into a manager agent with the given delegation policy
    pub fn as_manager(mut self, policy: OrchestratorPolicy) -> Self {
        self.kind = AgentKind::Gm;
        self.is_orchestrator = true;
        self.orchestrator_config = Some(policy);
        self
    }

    pub fn with_grant(mut self, app_id: impl Into<String>, permissions: &[ToolAction]) -> Self {
        self.app_access.push(AppAccessGrant::new(app_id, permissions));
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    pub fn is_manager(&self) -> bool {
        self.kind == AgentKind::Gm
    }

    /// Orchestrator flag or manager type
    pub fn is_orchestrating(&self) -> bool {
        self.is_orchestrator || self.is_manager()
    }

    /// Whether this agent gets the delegation tool
    pub fn can_delegate(&self) -> bool {
        self.is_orchestrating()
            && self
                .orchestrator_config
                .as_ref()
                .map(|p| p.can_delegate_to_agents)
                .unwrap_or(false)
    }

    pub fn granted_app_ids(&self) -> Vec<&str> {
        self.app_access.iter().map(|g| g.app_id.as_str()).collect()
    }

    /// Permitted actions for an app, merged across duplicate grants
    pub fn permitted_actions(&self, app_id: &str) -> Vec<ToolAction> {
        let mut actions = Vec::new();
        for grant in self.app_access.iter().filter(|g| g.app_id == app_id) {
            for action in &grant.permissions {
                if !actions.contains(action) {
                    actions.push(*action);
                }
            }
        }
        actions
    }

    pub fn system_context(&self) -> &str {
        self.context.as_deref().unwrap_or("")
    }

    /// Convert a stored document into a typed agent
    pub fn from_document(doc: Document) -> Result<Self> {
        let mut agent: Agent = serde_json::from_value(Value::Object(doc.fields))
            .map_err(|e| EngineError::Invalid(format!("Malformed agent '{}': {}", doc.id, e)))?;
        agent.id = doc.id;
        Ok(agent)
    }

    /// Document body for the store (id excluded)
    pub fn to_fields(&self) -> Fields {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Fields::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_document_camel_case() {
        let doc = Document::new(
            "agent-2",
            crate::store::fields_from(json!({
                "workspaceId": "ws-1",
                "name": "Pyramid Bot",
                "type": "custom",
                "appAccess": [{"appId": "pyramids", "permissions": ["create", "read", "list"]}],
                "modelMode": "auto",
                "modelName": null,
                "context": "You manage pyramids."
            })),
        );

        let agent = Agent::from_document(doc).unwrap();
        assert_eq!(agent.id, "agent-2");
        assert_eq!(agent.kind, AgentKind::Custom);
        assert_eq!(agent.granted_app_ids(), vec!["pyramids"]);
        assert_eq!(
            agent.permitted_actions("pyramids"),
            vec![ToolAction::Create, ToolAction::Read, ToolAction::List]
        );
        assert_eq!(agent.system_context(), "You manage pyramids.");
        assert!(!agent.is_orchestrating());
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let doc = Document::new(
            "a",
            crate::store::fields_from(json!({
                "appAccess": [{"appId": "pyramids", "permissions": ["explode"]}]
            })),
        );
        assert!(Agent::from_document(doc).is_err());
    }

    #[test]
    fn test_manager_builder_and_round_trip() {
        let agent = Agent::new("gm-1", "ws-1", "Jeana")
            .as_manager(OrchestratorPolicy::default())
            .with_context("Coordinate the team.");
        assert!(agent.is_manager());
        assert!(agent.can_delegate());

        let fields = agent.to_fields();
        assert_eq!(fields["type"], "gm");
        assert_eq!(fields["isOrchestrator"], true);
        assert_eq!(fields["orchestratorConfig"]["fallbackBehavior"], "handle_self");
        assert!(fields.get("id").is_none());

        let back = Agent::from_document(Document::new("gm-1", fields)).unwrap();
        assert_eq!(back, agent);
    }

    #[test]
    fn test_duplicate_grants_merge() {
        let agent = Agent::new("a", "ws", "A")
            .with_grant("diagrams", &[ToolAction::Read])
            .with_grant("diagrams", &[ToolAction::Read, ToolAction::List]);
        assert_eq!(
            agent.permitted_actions("diagrams"),
            vec![ToolAction::Read, ToolAction::List]
        );
    }
}
