//! Transcript message types
//!
//! Sessions store semantic messages (`user`, `assistant`, `tool_call`,
//! `tool_result`). On every model request the transcript is replayed into
//! the wire format with `to_request_messages()`.

use crate::store::Fields;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionToolType, FunctionCall,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    ToolCall,
    ToolResult,
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    /// RFC 3339
    pub timestamp: String,
    #[serde(default)]
    pub metadata: Fields,
}

impl SessionMessage {
    pub fn new(role: MessageRole, content: impl Into<String>, metadata: Fields) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            metadata,
        }
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// Content of a `tool_call` transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_id: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub call_id: String,
}

impl ToolCallRecord {
    pub fn new(tool_id: impl Into<String>, args: Value, call_id: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            args,
            call_id: call_id.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Which transcript entries to replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    /// Everything, tool traffic included
    Full,
    /// Only user and assistant turns (plain chat)
    ChatOnly,
}

fn system_message(content: &str) -> Option<ChatCompletionRequestMessage> {
    ChatCompletionRequestSystemMessageArgs::default()
        .content(content)
        .build()
        .ok()
        .map(Into::into)
}

pub fn user_message(content: &str) -> Option<ChatCompletionRequestMessage> {
    ChatCompletionRequestUserMessageArgs::default()
        .content(content)
        .build()
        .ok()
        .map(Into::into)
}

fn assistant_message(content: &str) -> Option<ChatCompletionRequestMessage> {
    ChatCompletionRequestAssistantMessageArgs::default()
        .content(content)
        .build()
        .ok()
        .map(Into::into)
}

/// Assistant message carrying tool calls and no text
pub fn tool_call_message(calls: &[ToolCallRecord]) -> Option<ChatCompletionRequestMessage> {
    let tool_calls: Vec<ChatCompletionMessageToolCall> = calls
        .iter()
        .map(|c| ChatCompletionMessageToolCall {
            id: c.call_id.clone(),
            r#type: ChatCompletionToolType::Function,
            function: FunctionCall {
                name: c.tool_id.clone(),
                arguments: c.args.to_string(),
            },
        })
        .collect();

    ChatCompletionRequestAssistantMessageArgs::default()
        .tool_calls(tool_calls)
        .build()
        .ok()
        .map(Into::into)
}

pub fn tool_result_message(call_id: &str, content: &str) -> Option<ChatCompletionRequestMessage> {
    let content = if content.is_empty() {
        "<Tool returned an empty string>"
    } else {
        content
    };
    ChatCompletionRequestToolMessageArgs::default()
        .tool_call_id(call_id)
        .content(content)
        .build()
        .ok()
        .map(Into::into)
}

/// Replay a transcript into request messages, preceded by the system prompt
/// when it is non-empty. Unparseable `tool_call` entries and `tool_result`
/// entries without a `call_id` are dropped.
pub fn to_request_messages(
    system_prompt: &str,
    transcript: &[SessionMessage],
    replay: Replay,
) -> Vec<ChatCompletionRequestMessage> {
    let mut messages = Vec::new();
    if !system_prompt.is_empty() {
        messages.extend(system_message(system_prompt));
    }

    for msg in transcript {
        let converted = match (msg.role, replay) {
            (MessageRole::User, _) => user_message(&msg.content),
            (MessageRole::Assistant, _) => assistant_message(&msg.content),
            (MessageRole::ToolCall, Replay::Full) => {
                serde_json::from_str::<ToolCallRecord>(&msg.content)
                    .ok()
                    .and_then(|record| tool_call_message(&[record]))
            }
            // results with no matching call (delegation traces) have no native shape
            (MessageRole::ToolResult, Replay::Full) => msg
                .metadata_str("call_id")
                .filter(|id| !id.is_empty())
                .and_then(|id| tool_result_message(id, &msg.content)),
            (_, Replay::ChatOnly) => None,
        };
        messages.extend(converted);
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(role: MessageRole, content: &str, metadata: Value) -> SessionMessage {
        SessionMessage::new(role, content, crate::store::fields_from(metadata))
    }

    fn transcript() -> Vec<SessionMessage> {
        vec![
            entry(MessageRole::User, "Create a pyramid", json!({})),
            entry(
                MessageRole::ToolCall,
                &ToolCallRecord::new("pyramids.create", json!({"title": "Q3"}), "call_1").to_json(),
                json!({"tool_id": "pyramids.create"}),
            ),
            entry(
                MessageRole::ToolResult,
                r#"{"success":true,"id":"p1"}"#,
                json!({"tool_id": "pyramids.create", "call_id": "call_1"}),
            ),
            entry(MessageRole::Assistant, "Created it.", json!({"model": "m"})),
        ]
    }

    #[test]
    fn test_full_replay() {
        let messages = to_request_messages("system", &transcript(), Replay::Full);
        assert_eq!(messages.len(), 5);

        match &messages[2] {
            ChatCompletionRequestMessage::Assistant(msg) => {
                let calls = msg.tool_calls.as_ref().unwrap();
                assert_eq!(calls[0].id, "call_1");
                assert_eq!(calls[0].function.name, "pyramids.create");
            }
            other => panic!("expected assistant tool call, got {:?}", other),
        }
        match &messages[3] {
            ChatCompletionRequestMessage::Tool(msg) => assert_eq!(msg.tool_call_id, "call_1"),
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[test]
    fn test_chat_only_replay_skips_tool_traffic() {
        let messages = to_request_messages("", &transcript(), Replay::ChatOnly);
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::User(_)));
        assert!(matches!(messages[1], ChatCompletionRequestMessage::Assistant(_)));
    }

    #[test]
    fn test_uncorrelated_tool_result_is_dropped() {
        let mut transcript = transcript();
        transcript.insert(
            1,
            entry(
                MessageRole::ToolResult,
                r#"{"success":true,"delegation":{}}"#,
                json!({"type": "delegation", "agent_id": "pyr"}),
            ),
        );
        let messages = to_request_messages("system", &transcript, Replay::Full);
        assert_eq!(messages.len(), 5);
        assert!(matches!(messages[2], ChatCompletionRequestMessage::Assistant(_)));
        match &messages[3] {
            ChatCompletionRequestMessage::Tool(msg) => assert_eq!(msg.tool_call_id, "call_1"),
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_tool_call_is_dropped() {
        let transcript = vec![entry(MessageRole::ToolCall, "not json", json!({}))];
        assert!(to_request_messages("", &transcript, Replay::Full).is_empty());
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_value(MessageRole::ToolResult).unwrap(), json!("tool_result"));
        let msg: SessionMessage = serde_json::from_value(json!({
            "id": "m1", "role": "tool_call", "content": "{}", "timestamp": "t"
        }))
        .unwrap();
        assert_eq!(msg.role, MessageRole::ToolCall);
        assert!(msg.metadata.is_empty());
    }
}
