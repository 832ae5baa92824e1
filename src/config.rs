//! Configuration for the agent platform

use crate::provider::ProviderConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "AGENT_PLATFORM_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Where sessions, agents and app documents live
    pub store: StoreConfig,

    /// Telemetry settings
    pub telemetry: TelemetryConfig,

    /// Plan-trigger heuristic
    pub planning: PlanningConfig,

    /// Remote tool servers discovered at startup
    pub mcp_servers: Vec<McpServerConfig>,

    /// Directory of YAML agent profiles to seed
    pub agents_dir: Option<PathBuf>,

    /// Workspace and user the CLI acts as
    pub workspace_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider preset (anthropic, openai, openrouter, gemini, grok, deepseek, custom)
    pub provider: String,

    /// Model name/ID
    pub model: String,

    /// Base URL override (for custom endpoints like LM Studio)
    pub base_url: Option<String>,

    /// Environment variable holding the API key, overriding the preset's
    pub api_key_env: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            base_url: None,
            api_key_env: None,
        }
    }
}

impl LlmConfig {
    /// Resolve the preset and apply overrides
    pub fn provider_config(&self) -> anyhow::Result<ProviderConfig> {
        let mut provider = match ProviderConfig::preset(&self.provider) {
            Some(preset) => preset,
            None => {
                let base_url = self.base_url.clone().with_context(|| {
                    format!("Unknown provider '{}' and no base_url set", self.provider)
                })?;
                ProviderConfig::custom(&self.provider, base_url, "LLM_API_KEY", &self.model)
            }
        };
        if let Some(base_url) = &self.base_url {
            provider.base_url = base_url.clone();
        }
        if let Some(env) = &self.api_key_env {
            provider.api_key_env = env.clone();
        }
        if !self.model.is_empty() {
            provider.default_model = self.model.clone();
        }
        Ok(provider)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    Memory,
    Sqlite { path: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Sqlite {
            path: PathBuf::from(".agent_platform/store.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Directory for log files
    pub log_dir: PathBuf,

    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(".agent_platform/logs"),
            verbose: false,
        }
    }
}

/// Keyword lists behind the default plan trigger. Matching is on the
/// lowercased message, so markers keep their surrounding spaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    pub keywords: Vec<String>,
    pub complexity_markers: Vec<String>,
    /// Markers needed to trigger planning without a keyword
    pub marker_threshold: usize,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            keywords: owned(&[
                "plan",
                "steps",
                "strategy",
                "how to",
                "break down",
                "multi-step",
                "workflow",
                "process",
                "sequence",
            ]),
            complexity_markers: owned(&[
                " and ", " then ", " after ", " before ", " finally ", "multiple", "several",
                "each", "all of",
            ]),
            marker_threshold: 2,
        }
    }
}

/// One remote tool server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub auth: Option<McpAuth>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum McpAuth {
    Bearer { token: String },
    ApiKey { key: String },
}

impl Config {
    /// Load from a YAML file (defaults when absent), then apply
    /// `AGENT_PLATFORM_*` environment overrides
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_yaml(&raw)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok());
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let mut config: Config = serde_yaml::from_str(raw)?;
        config.fill_identity();
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(provider) = var("LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(model) = var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(base_url) = var("LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }
        if let Some(path) = var("STORE_PATH") {
            self.store = StoreConfig::Sqlite {
                path: PathBuf::from(path),
            };
        }
        if let Some(dir) = var("LOG_DIR") {
            self.telemetry.log_dir = PathBuf::from(dir);
        }
        self.fill_identity();
    }

    fn fill_identity(&mut self) {
        if self.workspace_id.is_empty() {
            self.workspace_id = "default".to_string();
        }
        if self.user_id.is_empty() {
            self.user_id = "local".to_string();
        }
    }

    /// Set verbose logging
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.telemetry.verbose = verbose;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.model, "claude-3-5-sonnet-20241022");
        assert_eq!(config.workspace_id, "default");
        assert_eq!(config.planning.marker_threshold, 2);
        assert!(config.planning.keywords.contains(&"break down".to_string()));
        assert!(config.mcp_servers.is_empty());
    }

    #[test]
    fn test_yaml_sections() {
        let config = Config::from_yaml(
            r#"
llm:
  provider: openrouter
  model: openai/gpt-4o
store:
  kind: memory
planning:
  keywords: [roadmap]
  marker_threshold: 3
mcp_servers:
  - name: files
    url: http://localhost:9000
    auth:
      type: bearer
      token: secret
  - name: broken
agents_dir: ./agents
"#,
        )
        .unwrap();

        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.planning.keywords, vec!["roadmap"]);
        assert_eq!(config.planning.complexity_markers.len(), 9);
        assert_eq!(
            config.mcp_servers[0].auth,
            Some(McpAuth::Bearer {
                token: "secret".to_string()
            })
        );
        assert!(config.mcp_servers[1].url.is_none());
        assert_eq!(config.agents_dir, Some(PathBuf::from("./agents")));

        let provider = config.llm.provider_config().unwrap();
        assert_eq!(provider.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(provider.default_model, "openai/gpt-4o");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LLM_PROVIDER", "lmstudio"),
            ("LLM_BASE_URL", "http://localhost:1234/v1"),
            ("STORE_PATH", "/tmp/agents.db"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(
            config.store,
            StoreConfig::Sqlite {
                path: PathBuf::from("/tmp/agents.db")
            }
        );
        let provider = config.llm.provider_config().unwrap();
        assert_eq!(provider.name, "lmstudio");
        assert_eq!(provider.base_url, "http://localhost:1234/v1");
    }

    #[test]
    fn test_unknown_provider_needs_base_url() {
        let mut config = Config::default();
        config.llm.provider = "nowhere".to_string();
        assert!(config.llm.provider_config().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.yaml"))).unwrap();
        assert_eq!(config.user_id, "local");
    }
}
