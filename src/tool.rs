//! Tool system
//!
//! Apps bundle CRUD-style tools. Every tool carries a `ToolHandler` that the
//! execution loop, the planning engine and the delegation helper invoke the
//! same way. The `ToolRegistry` is built once at startup and then shared
//! read-only behind an `Arc`.

use crate::error::{EngineError, Result};
use crate::store::DocumentStore;
use async_openai::types::{ChatCompletionTool, ChatCompletionToolType, FunctionObject};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// The five recognized action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolAction {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl ToolAction {
    pub const ALL: [ToolAction; 5] = [
        ToolAction::Create,
        ToolAction::Read,
        ToolAction::Update,
        ToolAction::Delete,
        ToolAction::List,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolAction::Create => "create",
            ToolAction::Read => "read",
            ToolAction::Update => "update",
            ToolAction::Delete => "delete",
            ToolAction::List => "list",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl fmt::Display for ToolAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a tool call: `{"success": bool, "error"?: str, ...payload}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl ToolOutcome {
    /// Successful outcome; object payloads are flattened next to `success`
    pub fn success(payload: Value) -> Self {
        let data = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        Self {
            success: true,
            error: None,
            data,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: Map::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({"success": self.success}))
    }

    /// Read an outcome back from a stored JSON value. Anything without a
    /// boolean `success` is treated as a failure.
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone())
            .unwrap_or_else(|_| Self::failure(format!("Malformed tool result: {}", value)))
    }
}

/// Context passed to tool handlers
#[derive(Clone)]
pub struct ToolContext {
    pub store: Arc<dyn DocumentStore>,
    pub workspace_id: String,
    pub user_id: String,
}

impl ToolContext {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        workspace_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            workspace_id: workspace_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Capability behind every tool, local or remote
///
/// An `Err` is a handler fault; callers convert it into a failed
/// `ToolOutcome` and keep going.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<ToolOutcome>;
}

type BoxedFn = dyn Fn(ToolContext, Value) -> BoxFuture<'static, Result<ToolOutcome>> + Send + Sync;

/// Adapts an async closure into a `ToolHandler`
pub struct FnHandler {
    f: Box<BoxedFn>,
}

impl FnHandler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(ToolContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutcome>> + Send + 'static,
    {
        Self {
            f: Box::new(move |ctx, args| f(ctx, args).boxed()),
        }
    }
}

#[async_trait]
impl ToolHandler for FnHandler {
    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<ToolOutcome> {
        (self.f)(ctx.clone(), args).await
    }
}

/// Shorthand for building a closure-backed handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(ToolContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolOutcome>> + Send + 'static,
{
    Arc::new(FnHandler::new(f))
}

/// One callable action
#[derive(Clone)]
pub struct ToolDefinition {
    /// `<app_id>.<action>` for catalog tools, `mcp:<server>:<tool>` for remote ones
    pub tool_id: String,
    pub app_id: String,
    pub action: ToolAction,
    /// Human-readable, e.g. "Create Pyramid"
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments
    pub parameters: Value,
    pub handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("tool_id", &self.tool_id)
            .field("app_id", &self.app_id)
            .field("action", &self.action)
            .field("name", &self.name)
            .finish()
    }
}

impl ToolDefinition {
    /// Catalog tool with id `<app_id>.<action>`
    pub fn new(
        app_id: impl Into<String>,
        action: ToolAction,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        let app_id = app_id.into();
        Self {
            tool_id: format!("{}.{}", app_id, action),
            app_id,
            action,
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
        }
    }

    /// Override the tool id (namespaced remote tools)
    pub fn with_id(mut self, tool_id: impl Into<String>) -> Self {
        self.tool_id = tool_id.into();
        self
    }

    /// Either `<app_id>.<action>` or namespaced under `<app_id>:`
    pub fn has_valid_id(&self) -> bool {
        if let Some((app, action)) = self.tool_id.rsplit_once('.') {
            if app == self.app_id && ToolAction::parse(action) == Some(self.action) {
                return true;
            }
        }
        self.tool_id
            .strip_prefix(self.app_id.as_str())
            .map(|rest| rest.len() > 1 && rest.starts_with(':'))
            .unwrap_or(false)
    }

    /// Invoke the handler, turning faults into failed outcomes
    pub async fn invoke(&self, ctx: &ToolContext, args: Value) -> ToolOutcome {
        match self.handler.call(ctx, args).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(tool_id = %self.tool_id, error = %e, "Tool handler failed");
                ToolOutcome::failure(e.to_string())
            }
        }
    }

    /// OpenAI function-tool shape, named by tool id
    pub fn to_openai_tool(&self) -> ChatCompletionTool {
        ChatCompletionTool {
            r#type: ChatCompletionToolType::Function,
            function: FunctionObject {
                name: self.tool_id.clone(),
                description: Some(self.description.clone()),
                parameters: Some(self.parameters.clone()),
                strict: None,
            },
        }
    }
}

/// Convert a tool set into the function list bound to the model
pub fn to_openai_tools(tools: &[ToolDefinition]) -> Vec<ChatCompletionTool> {
    tools.iter().map(|t| t.to_openai_tool()).collect()
}

/// A named capability domain and its tools
#[derive(Debug, Clone)]
pub struct AppDefinition {
    pub app_id: String,
    pub name: String,
    /// Backing store collection
    pub collection: String,
    pub description: String,
    /// JSON Schema of the app's documents
    pub data_schema: Value,
    pub usage_guidelines: String,
    pub example_prompts: Vec<String>,
    pub tools: Vec<ToolDefinition>,
}

impl AppDefinition {
    /// Actions exposed by this app, in tool order
    pub fn available_actions(&self) -> Vec<ToolAction> {
        let mut actions = Vec::new();
        for tool in &self.tools {
            if !actions.contains(&tool.action) {
                actions.push(tool.action);
            }
        }
        actions
    }
}

/// Registry of apps and tools, keyed by app id and tool id
///
/// Populated during startup (catalog, then remote discovery) and shared
/// immutably afterwards. There is no removal.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    apps: IndexMap<String, AppDefinition>,
    tools: IndexMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an app and its tools. Re-registering an app id replaces it.
    pub fn register(&mut self, app: AppDefinition) -> Result<()> {
        if let Some(bad) = app
            .tools
            .iter()
            .find(|t| t.app_id != app.app_id || !t.has_valid_id())
        {
            return Err(EngineError::Invalid(format!(
                "Tool '{}' does not belong to app '{}'",
                bad.tool_id, app.app_id
            )));
        }

        if let Some(previous) = self.apps.get(&app.app_id) {
            for tool in &previous.tools {
                self.tools.shift_remove(&tool.tool_id);
            }
        }
        for tool in &app.tools {
            self.tools.insert(tool.tool_id.clone(), tool.clone());
        }
        tracing::debug!(app_id = %app.app_id, tools = app.tools.len(), "Registered app");
        self.apps.insert(app.app_id.clone(), app);
        Ok(())
    }

    pub fn get_app(&self, app_id: &str) -> Option<&AppDefinition> {
        self.apps.get(app_id)
    }

    pub fn get_tool(&self, tool_id: &str) -> Option<&ToolDefinition> {
        self.tools.get(tool_id)
    }

    pub fn list_apps(&self) -> Vec<&AppDefinition> {
        self.apps.values().collect()
    }

    pub fn list_tools(&self) -> Vec<&ToolDefinition> {
        self.tools.values().collect()
    }

    pub fn tools_for_app(&self, app_id: &str) -> Vec<&ToolDefinition> {
        self.tools.values().filter(|t| t.app_id == app_id).collect()
    }

    /// Union of the tools of several apps
    pub fn tools_for_apps(&self, app_ids: &[&str]) -> Vec<&ToolDefinition> {
        self.tools
            .values()
            .filter(|t| app_ids.contains(&t.app_id.as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Freeze the registry for sharing
    pub fn into_shared(self) -> Arc<ToolRegistry> {
        Arc::new(self)
    }
}
