//! Language model seam
//!
//! The engine talks to models only through `LanguageModel`. `bind` pairs a
//! model with a tool list so callers can invoke it with messages alone.

use crate::error::Result;
use async_openai::types::{ChatCompletionRequestMessage, ChatCompletionTool};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelToolCall {
    pub id: String,
    /// Tool id as registered (not the wire name)
    pub name: String,
    pub args: Value,
}

/// One model response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ModelToolCall>,
    /// Model that produced the reply
    pub model: String,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            tool_calls: vec![ModelToolCall {
                id: id.into(),
                name: name.into(),
                args,
            }],
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model used when the caller names none
    fn default_model(&self) -> &str;

    /// Invoke the model. Provider faults are `EngineError::LanguageModel`.
    async fn invoke(
        &self,
        messages: &[ChatCompletionRequestMessage],
        tools: &[ChatCompletionTool],
        model: Option<&str>,
    ) -> Result<ModelReply>;
}

/// A model with its tool list and model override fixed
#[derive(Clone)]
pub struct BoundModel {
    model: Arc<dyn LanguageModel>,
    tools: Vec<ChatCompletionTool>,
    model_name: Option<String>,
}

impl BoundModel {
    pub fn with_model(mut self, model_name: Option<String>) -> Self {
        self.model_name = model_name;
        self
    }

    /// Name reported for replies: the override, else the provider default
    pub fn model_name(&self) -> String {
        self.model_name
            .clone()
            .unwrap_or_else(|| self.model.default_model().to_string())
    }

    pub async fn invoke(&self, messages: &[ChatCompletionRequestMessage]) -> Result<ModelReply> {
        self.model
            .invoke(messages, &self.tools, self.model_name.as_deref())
            .await
    }
}

/// Bind a tool list to a model
pub fn bind(model: Arc<dyn LanguageModel>, tools: Vec<ChatCompletionTool>) -> BoundModel {
    BoundModel {
        model,
        tools,
        model_name: None,
    }
}
