//! Remote tools as registry entries

use super::client::{McpClient, RemoteTool};
use crate::error::Result;
use crate::tool::{AppDefinition, ToolAction, ToolContext, ToolDefinition, ToolHandler, ToolOutcome};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Forwards calls to one tool of a remote server
pub struct McpToolHandler {
    client: Arc<McpClient>,
    tool_name: String,
}

#[async_trait]
impl ToolHandler for McpToolHandler {
    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<ToolOutcome> {
        Ok(self.client.call_tool(&self.tool_name, args).await)
    }
}

pub fn remote_app_id(server: &str) -> String {
    format!("mcp:{}", server)
}

/// `mcp:<server>:<tool>`, action `create`
pub fn remote_tool_definition(client: &Arc<McpClient>, remote: &RemoteTool) -> ToolDefinition {
    let server = client.name();
    ToolDefinition::new(
        remote_app_id(server),
        ToolAction::Create,
        remote.name.clone(),
        remote
            .description
            .clone()
            .unwrap_or_else(|| format!("MCP tool from {}", server)),
        remote
            .input_schema
            .clone()
            .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
        Arc::new(McpToolHandler {
            client: client.clone(),
            tool_name: remote.name.clone(),
        }),
    )
    .with_id(format!("mcp:{}:{}", server, remote.name))
}

/// One app per server holding its discovered tools
pub fn remote_app(client: &Arc<McpClient>, tools: Vec<ToolDefinition>) -> AppDefinition {
    let server = client.name();
    AppDefinition {
        app_id: remote_app_id(server),
        name: server.to_string(),
        collection: String::new(),
        description: format!("Tools served by the remote MCP server '{}'", server),
        data_schema: json!({}),
        usage_guidelines: String::new(),
        example_prompts: Vec::new(),
        tools,
    }
}
