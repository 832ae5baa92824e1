//! Agent profile loader
//!
//! Seeds agent profiles from YAML files in a directory, one file per agent.
//! The file stem is the agent id.

use super::config::Agent;
use crate::error::{EngineError, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Load every `*.yaml` / `*.yml` profile in `dir`, sorted by id
///
/// Unreadable or malformed files are skipped with a warning.
pub fn load_agent_profiles(dir: &Path, workspace_id: &str) -> Vec<Agent> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Failed to read agents directory");
            return Vec::new();
        }
    };

    let mut agents = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();

        let ext = path.extension().and_then(|e| e.to_str());
        if !matches!(ext, Some("yaml") | Some("yml")) {
            continue;
        }

        let id = match path.file_stem().and_then(|s| s.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };

        match load_profile_file(&path) {
            Ok(mut agent) => {
                agent.id = id;
                if agent.workspace_id.is_empty() {
                    agent.workspace_id = workspace_id.to_string();
                }
                agents.push(agent);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load agent profile");
            }
        }
    }

    agents.sort_by(|a, b| a.id.cmp(&b.id));
    agents
}

/// Load a single agent profile from a YAML file
pub fn load_profile_file(path: &Path) -> Result<Agent> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Config(format!("Failed to read file: {}", e)))?;

    serde_yaml::from_str(&content)
        .map_err(|e| EngineError::Config(format!("Failed to parse YAML: {}", e)))
}

/// Save an agent profile to a YAML file
pub fn save_profile_file(path: &Path, agent: &Agent) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| EngineError::Config(format!("Failed to create directory: {}", e)))?;
    }

    let content = serde_yaml::to_string(agent)
        .map_err(|e| EngineError::Config(format!("Failed to serialize agent: {}", e)))?;

    std::fs::write(path, content)
        .map_err(|e| EngineError::Config(format!("Failed to write file: {}", e)))
}

/// Where a profile with this id lives inside `dir`
pub fn profile_path(dir: &Path, agent_id: &str) -> PathBuf {
    dir.join(format!("{}.yaml", agent_id))
}
