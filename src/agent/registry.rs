//! Agent directory
//!
//! Agent profiles live in the `agents` collection of the document store and
//! are converted to `Agent` on the way out.

use super::builtins::default_manager;
use super::config::Agent;
use super::config_loader::load_agent_profiles;
use crate::error::{EngineError, Result};
use crate::store::{new_document_id, DocumentStore};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub const AGENTS_COLLECTION: &str = "agents";

#[derive(Clone)]
pub struct AgentDirectory {
    store: Arc<dyn DocumentStore>,
}

impl AgentDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn get_agent(&self, agent_id: &str) -> Result<Agent> {
        let doc = self
            .store
            .get(AGENTS_COLLECTION, agent_id)?
            .ok_or_else(|| EngineError::not_found("agent", agent_id))?;
        Agent::from_document(doc)
    }

    /// Agents of a workspace in creation order; malformed profiles are skipped
    pub fn list_agents(&self, workspace_id: &str) -> Result<Vec<Agent>> {
        let docs = self.store.list_where(
            AGENTS_COLLECTION,
            "workspaceId",
            &Value::String(workspace_id.to_string()),
        )?;

        Ok(docs
            .into_iter()
            .filter_map(|doc| {
                let id = doc.id.clone();
                match Agent::from_document(doc) {
                    Ok(agent) => Some(agent),
                    Err(e) => {
                        warn!(agent_id = %id, error = %e, "Skipping malformed agent");
                        None
                    }
                }
            })
            .collect())
    }

    /// Insert or replace a profile. An empty id gets a fresh one.
    pub fn save_agent(&self, agent: &Agent) -> Result<Agent> {
        let mut saved = agent.clone();
        if saved.id.is_empty() {
            saved.id = new_document_id();
        }

        let now = Value::String(chrono::Utc::now().to_rfc3339());
        let mut fields = saved.to_fields();
        let created_at = self
            .store
            .get(AGENTS_COLLECTION, &saved.id)?
            .and_then(|doc| doc.get("createdAt").cloned())
            .unwrap_or_else(|| now.clone());
        fields.insert("createdAt".to_string(), created_at);
        fields.insert("updatedAt".to_string(), now);

        self.store.set(AGENTS_COLLECTION, &saved.id, fields)?;
        debug!(agent_id = %saved.id, name = %saved.name, "Saved agent");
        Ok(saved)
    }

    pub fn delete_agent(&self, agent_id: &str) -> Result<()> {
        let agent = self.get_agent(agent_id)?;
        if agent.is_default {
            return Err(EngineError::Forbidden(
                "Cannot delete the default agent".to_string(),
            ));
        }
        self.store.delete(AGENTS_COLLECTION, agent_id)
    }

    /// Return the workspace's default agent, creating the default manager if
    /// there is none
    pub fn ensure_default_manager(&self, workspace_id: &str) -> Result<Agent> {
        if let Some(existing) = self
            .list_agents(workspace_id)?
            .into_iter()
            .find(|a| a.is_default)
        {
            return Ok(existing);
        }
        self.save_agent(&default_manager("", workspace_id))
    }

    /// Store every YAML profile found in `dir` under `workspace_id`
    pub fn seed_from_dir(&self, dir: &Path, workspace_id: &str) -> Result<usize> {
        let agents = load_agent_profiles(dir, workspace_id);
        for agent in &agents {
            self.save_agent(agent)?;
        }
        Ok(agents.len())
    }
}
