//! Deterministic model for tests and offline runs
//!
//! Replays queued replies in order, then the repeat reply (if any), and
//! records every request it receives.

use super::model::{LanguageModel, ModelReply};
use crate::error::{EngineError, Result};
use async_openai::types::{ChatCompletionRequestMessage, ChatCompletionTool};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// What the model was asked
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<ChatCompletionRequestMessage>,
    pub tool_names: Vec<String>,
    pub model: Option<String>,
}

pub struct ScriptedModel {
    name: String,
    replies: Mutex<VecDeque<ModelReply>>,
    repeat: Option<ModelReply>,
    failure: Option<String>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            name: "scripted".to_string(),
            replies: Mutex::new(VecDeque::new()),
            repeat: None,
            failure: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(self, reply: ModelReply) -> Self {
        self.replies.lock().push_back(reply);
        self
    }

    pub fn with_text(self, content: &str) -> Self {
        self.with_reply(ModelReply::text(content))
    }

    /// Reply returned once the queue is empty, forever
    pub fn repeating(mut self, reply: ModelReply) -> Self {
        self.repeat = Some(reply);
        self
    }

    /// Every call fails with a provider error
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn default_model(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        messages: &[ChatCompletionRequestMessage],
        tools: &[ChatCompletionTool],
        model: Option<&str>,
    ) -> Result<ModelReply> {
        self.requests.lock().push(RecordedRequest {
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|t| t.function.name.clone()).collect(),
            model: model.map(|m| m.to_string()),
        });

        if let Some(message) = &self.failure {
            return Err(EngineError::LanguageModel(message.clone()));
        }

        let next = self.replies.lock().pop_front();
        let mut reply = next
            .or_else(|| self.repeat.clone())
            .ok_or_else(|| EngineError::LanguageModel("scripted model has no replies left".to_string()))?;
        if reply.model.is_empty() {
            reply.model = model.unwrap_or(self.name.as_str()).to_string();
        }
        Ok(reply)
    }
}
