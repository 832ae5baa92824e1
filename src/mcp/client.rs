//! HTTP client for one remote tool server
//!
//! Discovery is `POST {url}/tools/list` with `{}`; calls are
//! `POST {url}/tools/call` with `{name, arguments}`.

use crate::config::{McpAuth, McpServerConfig};
use crate::error::{EngineError, Result};
use crate::tool::ToolOutcome;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

pub const MCP_TIMEOUT: Duration = Duration::from_secs(10);

/// A tool as the server describes it
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTool {
    #[serde(default = "unknown_name")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
}

fn unknown_name() -> String {
    "unknown".to_string()
}

#[derive(Debug, Default, Deserialize)]
struct ToolList {
    #[serde(default)]
    tools: Vec<RemoteTool>,
}

pub struct McpClient {
    name: String,
    url: String,
    auth: Option<McpAuth>,
    http: Client,
    tools: RwLock<Vec<RemoteTool>>,
    connected: AtomicBool,
}

impl McpClient {
    pub fn new(name: impl Into<String>, url: &str, auth: Option<McpAuth>) -> Result<Self> {
        let http = Client::builder()
            .timeout(MCP_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            name: name.into(),
            url: url.trim_end_matches('/').to_string(),
            auth,
            http,
            tools: RwLock::new(Vec::new()),
            connected: AtomicBool::new(false),
        })
    }

    /// Client for a configured server; `None` when it has no URL
    pub fn from_config(config: &McpServerConfig) -> Result<Option<Self>> {
        match config.url.as_deref().filter(|u| !u.is_empty()) {
            Some(url) => Self::new(&config.name, url, config.auth.clone()).map(Some),
            None => Ok(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn tools(&self) -> Vec<RemoteTool> {
        self.tools.read().clone()
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = match &self.auth {
            Some(McpAuth::Bearer { token }) => {
                HeaderValue::from_str(&format!("Bearer {}", token)).map(|v| (AUTHORIZATION, v))
            }
            Some(McpAuth::ApiKey { key }) => {
                HeaderValue::from_str(key).map(|v| (reqwest::header::HeaderName::from_static("x-api-key"), v))
            }
            None => return headers,
        };
        match auth {
            Ok((name, value)) => {
                headers.insert(name, value);
            }
            Err(e) => warn!(server = %self.name, error = %e, "Invalid MCP credentials, sending none"),
        }
        headers
    }

    /// Discover the server's tools. Failures leave the client disconnected
    /// with no tools.
    pub async fn connect(&self) -> Vec<RemoteTool> {
        match self.list_tools().await {
            Ok(tools) => {
                info!(server = %self.name, tools = tools.len(), "Connected to MCP server");
                *self.tools.write() = tools.clone();
                self.connected.store(true, Ordering::SeqCst);
                tools
            }
            Err(e) => {
                warn!(server = %self.name, error = %e, "Failed to connect to MCP server");
                self.disconnect();
                Vec::new()
            }
        }
    }

    async fn list_tools(&self) -> std::result::Result<Vec<RemoteTool>, reqwest::Error> {
        let list: ToolList = self
            .http
            .post(format!("{}/tools/list", self.url))
            .headers(self.headers())
            .json(&json!({}))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list.tools)
    }

    /// Call a tool; every failure is reported as a failed outcome
    pub async fn call_tool(&self, tool_name: &str, args: Value) -> ToolOutcome {
        if !self.is_connected() {
            return ToolOutcome::failure(format!("Not connected to MCP server '{}'", self.name));
        }

        let response = self
            .http
            .post(format!("{}/tools/call", self.url))
            .headers(self.headers())
            .json(&json!({ "name": tool_name, "arguments": args }))
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let body = match response {
            Ok(response) => response.json::<Value>().await,
            Err(e) => Err(e),
        };

        match body {
            Ok(mut data) => {
                let result = if data.get("content").is_some() {
                    data["content"].take()
                } else {
                    data
                };
                ToolOutcome::success(json!({ "result": result }))
            }
            Err(e) => match e.status() {
                Some(status) => ToolOutcome::failure(format!("MCP server error: {}", status.as_u16())),
                None => ToolOutcome::failure(format!("MCP call failed: {}", e)),
            },
        }
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.tools.write().clear();
    }
}


#[cfg(test)]
mod tests {
    use super::test_server::spawn;
    use super::*;

    fn tools_body() -> String {
        json!({
            "tools": [
                {
                    "name": "create_issue",
                    "description": "Create a GitHub issue",
                    "inputSchema": {"type": "object", "properties": {"title": {"type": "string"}}, "required": ["title"]}
                },
                {"name": "list_repos"}
            ]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_connect_discovers_tools_with_bearer_auth() {
        let (url, seen) = spawn(|_| (200, tools_body())).await;
        let client = McpClient::new(
            "github",
            &format!("{}/", url),
            Some(McpAuth::Bearer {
                token: "my-secret-token".to_string(),
            }),
        )
        .unwrap();

        let tools = client.connect().await;
        assert!(client.is_connected());
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "create_issue");
        assert!(tools[1].description.is_none());

        let seen = seen.lock();
        assert_eq!(seen[0].path, "/tools/list");
        assert_eq!(seen[0].body, "{}");
        assert!(seen[0]
            .head
            .to_lowercase()
            .contains("authorization: bearer my-secret-token"));
    }

    #[tokio::test]
    async fn test_api_key_header() {
        let (url, seen) = spawn(|_| (200, r#"{"tools": []}"#.to_string())).await;
        let client = McpClient::new(
            "files",
            &url,
            Some(McpAuth::ApiKey {
                key: "k-123".to_string(),
            }),
        )
        .unwrap();
        client.connect().await;
        assert!(seen.lock()[0].head.to_lowercase().contains("x-api-key: k-123"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_graceful() {
        let (url, _) = spawn(|_| (500, "{}".to_string())).await;
        let client = McpClient::new("broken", &url, None).unwrap();
        assert!(client.connect().await.is_empty());
        assert!(!client.is_connected());

        let refused = McpClient::new("gone", "http://127.0.0.1:1", None).unwrap();
        assert!(refused.connect().await.is_empty());
    }

    #[tokio::test]
    async fn test_call_tool() {
        let (url, seen) = spawn(|req| {
            if req.path == "/tools/call" {
                (
                    200,
                    json!({"content": [{"type": "text", "text": "Issue created #42"}]}).to_string(),
                )
            } else {
                (200, tools_body())
            }
        })
        .await;
        let client = McpClient::new("github", &url, None).unwrap();
        client.connect().await;

        let outcome = client
            .call_tool("create_issue", json!({"title": "Bug report"}))
            .await;
        assert!(outcome.is_success());
        assert_eq!(outcome.get("result").unwrap()[0]["text"], "Issue created #42");

        let sent: Value = serde_json::from_str(&seen.lock()[1].body).unwrap();
        assert_eq!(sent, json!({"name": "create_issue", "arguments": {"title": "Bug report"}}));
    }

    #[tokio::test]
    async fn test_call_tool_errors() {
        let client = McpClient::new("github", "http://127.0.0.1:1", None).unwrap();
        let outcome = client.call_tool("create_issue", json!({})).await;
        assert_eq!(
            outcome.error.as_deref(),
            Some("Not connected to MCP server 'github'")
        );

        let (url, _) = spawn(|req| {
            if req.path == "/tools/call" {
                (503, "{}".to_string())
            } else {
                (200, tools_body())
            }
        })
        .await;
        let client = McpClient::new("github", &url, None).unwrap();
        client.connect().await;
        let outcome = client.call_tool("create_issue", json!({})).await;
        assert_eq!(outcome.error.as_deref(), Some("MCP server error: 503"));
    }

    #[test]
    fn test_server_without_url_is_skipped() {
        let config = McpServerConfig {
            name: "nowhere".to_string(),
            url: None,
            auth: None,
        };
        assert!(McpClient::from_config(&config).unwrap().is_none());
    }
}
