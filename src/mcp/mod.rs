//! Remote tool servers (MCP over HTTP)
//!
//! Each configured server is queried once at startup. Its tools are
//! registered under the app `mcp:<server>` with ids `mcp:<server>:<tool>`
//! and forward calls over HTTP. A server that cannot be reached contributes
//! no tools.

mod client;
mod tool;

pub use client::{McpClient, RemoteTool, MCP_TIMEOUT};
pub use tool::{remote_app, remote_app_id, remote_tool_definition, McpToolHandler};

use crate::config::McpServerConfig;
use crate::error::Result;
use crate::tool::{AppDefinition, ToolRegistry};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::warn;

/// Clients of every connected server, keyed by server name
#[derive(Default)]
pub struct McpConnectionManager {
    clients: IndexMap<String, Arc<McpClient>>,
}

impl McpConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to every server with a URL; one app per server
    pub async fn connect_all(&mut self, servers: &[McpServerConfig]) -> Result<Vec<AppDefinition>> {
        let mut apps = Vec::new();
        for server in servers {
            let Some(client) = McpClient::from_config(server)? else {
                warn!(server = %server.name, "MCP server has no URL, skipping");
                continue;
            };
            let client = Arc::new(client);
            let tools = client
                .connect()
                .await
                .iter()
                .map(|remote| remote_tool_definition(&client, remote))
                .collect::<Vec<_>>();
            if !tools.is_empty() {
                apps.push(remote_app(&client, tools));
            }
            self.clients.insert(server.name.clone(), client);
        }
        Ok(apps)
    }

    /// Discover and add remote tools to a registry that is still being built
    pub async fn register_all(
        &mut self,
        registry: &mut ToolRegistry,
        servers: &[McpServerConfig],
    ) -> Result<usize> {
        let mut added = 0;
        for app in self.connect_all(servers).await? {
            added += app.tools.len();
            registry.register(app)?;
        }
        Ok(added)
    }

    pub fn get_client(&self, server: &str) -> Option<&Arc<McpClient>> {
        self.clients.get(server)
    }

    pub fn disconnect_all(&mut self) {
        for client in self.clients.values() {
            client.disconnect();
        }
        self.clients.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::client::test_server::spawn;
    use super::*;
    use crate::store::MemoryStore;
    use crate::tool::ToolContext;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_all_namespaces_tools() {
        let (url, _) = spawn(|req| {
            if req.path == "/tools/call" {
                (200, json!({"content": "pong"}).to_string())
            } else {
                (
                    200,
                    json!({"tools": [{"name": "ping", "description": "Ping it"}]}).to_string(),
                )
            }
        })
        .await;

        let servers = vec![
            McpServerConfig {
                name: "echo".to_string(),
                url: Some(url),
                auth: None,
            },
            McpServerConfig {
                name: "nowhere".to_string(),
                url: None,
                auth: None,
            },
        ];
        let mut registry = ToolRegistry::new();
        let mut manager = McpConnectionManager::new();
        let added = manager.register_all(&mut registry, &servers).await.unwrap();

        assert_eq!(added, 1);
        assert!(manager.get_client("echo").unwrap().is_connected());
        assert!(manager.get_client("nowhere").is_none());

        let tool = registry.get_tool("mcp:echo:ping").unwrap();
        assert_eq!(tool.app_id, "mcp:echo");
        assert_eq!(tool.description, "Ping it");

        let ctx = ToolContext::new(Arc::new(MemoryStore::new()), "ws-1", "user-1");
        let outcome = tool.invoke(&ctx, json!({})).await;
        assert_eq!(outcome.get("result"), Some(&json!("pong")));

        manager.disconnect_all();
        let outcome = tool.invoke(&ctx, json!({})).await;
        assert_eq!(outcome.error.as_deref(), Some("Not connected to MCP server 'echo'"));
    }

    #[tokio::test]
    async fn test_unreachable_server_adds_nothing() {
        let servers = vec![McpServerConfig {
            name: "down".to_string(),
            url: Some("http://127.0.0.1:1".to_string()),
            auth: None,
        }];
        let mut registry = ToolRegistry::new();
        let mut manager = McpConnectionManager::new();
        assert_eq!(manager.register_all(&mut registry, &servers).await.unwrap(), 0);
        assert!(registry.is_empty());
        assert!(!manager.get_client("down").unwrap().is_connected());
    }
}
