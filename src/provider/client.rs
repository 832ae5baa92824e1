//! OpenAI-compatible provider client
//!
//! Non-streaming chat completions with tool support. Tool ids such as
//! `pyramids.create` are not valid OpenAI function names, so they travel
//! under a sanitized wire name and are mapped back on return.

use super::model::{LanguageModel, ModelReply, ModelToolCall};
use super::ProviderConfig;
use crate::error::{EngineError, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionTool, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

const MAX_WIRE_NAME_LEN: usize = 64;

/// Provider-safe function name for a tool id (`[A-Za-z0-9_-]{1,64}`)
pub fn wire_name(tool_id: &str) -> String {
    tool_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_WIRE_NAME_LEN)
        .collect()
}

/// Wire names for one request. Ids that sanitize to the same name get a
/// numeric suffix, so every wire name maps back to exactly one tool id.
#[derive(Debug, Default)]
struct WireNames {
    to_wire: HashMap<String, String>,
    to_tool: HashMap<String, String>,
}

impl WireNames {
    fn new<'a>(tool_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut names = Self::default();
        for tool_id in tool_ids {
            if names.to_wire.contains_key(tool_id) {
                continue;
            }
            let base = wire_name(tool_id);
            let mut wire = base.clone();
            let mut n = 2;
            while names.to_tool.contains_key(&wire) {
                let suffix = format!("_{}", n);
                let keep = base.len().min(MAX_WIRE_NAME_LEN - suffix.len());
                wire = format!("{}{}", &base[..keep], suffix);
                n += 1;
            }
            names.to_wire.insert(tool_id.to_string(), wire.clone());
            names.to_tool.insert(wire, tool_id.to_string());
        }
        names
    }

    fn wire(&self, tool_id: &str) -> String {
        self.to_wire
            .get(tool_id)
            .cloned()
            .unwrap_or_else(|| wire_name(tool_id))
    }

    fn tool(&self, wire: &str) -> Option<&String> {
        self.to_tool.get(wire)
    }
}

/// OpenAI-compatible client wrapper
#[derive(Clone)]
pub struct ProviderClient {
    config: ProviderConfig,
    client: Client<OpenAIConfig>,
}

impl ProviderClient {
    /// Create a new provider client from config
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key = Self::get_api_key(&config)?;

        let openai_config = OpenAIConfig::new()
            .with_api_key(&api_key)
            .with_api_base(&config.base_url);

        Ok(Self {
            client: Client::with_config(openai_config),
            config,
        })
    }

    /// Get API key from environment or the XDG auth.json
    fn get_api_key(config: &ProviderConfig) -> Result<String> {
        let _ = dotenvy::dotenv();

        if let Ok(key) = std::env::var(&config.api_key_env) {
            return Ok(key);
        }

        if let Some(key) = Self::get_key_from_auth_json(&config.name) {
            return Ok(key);
        }

        Err(EngineError::Config(format!(
            "{} not found in environment or ~/.local/share/agent-platform/auth.json",
            config.api_key_env
        )))
    }

    /// Try to read the API key from `<data_dir>/agent-platform/auth.json`
    fn get_key_from_auth_json(provider_name: &str) -> Option<String> {
        let auth_path = dirs::data_dir()?.join("agent-platform").join("auth.json");

        let content = std::fs::read_to_string(&auth_path).ok()?;
        let auth: Value = serde_json::from_str(&content).ok()?;

        auth.get(provider_name.to_lowercase())?
            .get("key")?
            .as_str()
            .map(|s| s.to_string())
    }

    /// Get the provider config
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Send a non-streaming chat completion request with tools
    pub async fn chat_with_tools(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        tools: Vec<ChatCompletionTool>,
        model: Option<&str>,
    ) -> Result<CreateChatCompletionResponse> {
        let model = model.unwrap_or(&self.config.default_model);

        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder.model(model).messages(messages);

        if !tools.is_empty() {
            request_builder.tools(tools);
        }

        let request = request_builder
            .build()
            .map_err(|e| EngineError::LanguageModel(format!("Failed to build request: {}", e)))?;

        self.client
            .chat()
            .create(request)
            .await
            .map_err(|e| EngineError::LanguageModel(format!("API call failed: {}", e)))
    }
}

/// Rename tool calls in replayed assistant messages to their wire names
fn to_wire_messages(
    messages: &[ChatCompletionRequestMessage],
    names: &WireNames,
) -> Vec<ChatCompletionRequestMessage> {
    messages
        .iter()
        .cloned()
        .map(|mut msg| {
            if let ChatCompletionRequestMessage::Assistant(assistant) = &mut msg {
                if let Some(calls) = assistant.tool_calls.as_mut() {
                    for call in calls {
                        call.function.name = names.wire(&call.function.name);
                    }
                }
            }
            msg
        })
        .collect()
}

/// Convert a provider response into a `ModelReply`, restoring tool ids
fn to_reply(response: CreateChatCompletionResponse, names: &WireNames) -> ModelReply {
    let model = response.model.clone();
    let Some(choice) = response.choices.into_iter().next() else {
        return ModelReply {
            model,
            ..Default::default()
        };
    };

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let args = serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                tracing::warn!(target: "llm", error = %e, "Unparseable tool arguments");
                Value::Object(Default::default())
            });
            ModelToolCall {
                id: call.id,
                name: names
                    .tool(&call.function.name)
                    .cloned()
                    .unwrap_or(call.function.name),
                args,
            }
        })
        .collect();

    ModelReply {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
        model,
    }
}

#[async_trait]
impl LanguageModel for ProviderClient {
    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    async fn invoke(
        &self,
        messages: &[ChatCompletionRequestMessage],
        tools: &[ChatCompletionTool],
        model: Option<&str>,
    ) -> Result<ModelReply> {
        let names = WireNames::new(tools.iter().map(|t| t.function.name.as_str()));
        let wire_tools: Vec<ChatCompletionTool> = tools
            .iter()
            .cloned()
            .map(|mut tool| {
                tool.function.name = names.wire(&tool.function.name);
                tool
            })
            .collect();

        let start = std::time::Instant::now();
        tracing::info!(
            target: "llm",
            model = model.unwrap_or(&self.config.default_model),
            message_count = messages.len(),
            tool_count = tools.len(),
            "Starting LLM call"
        );

        let response = self
            .chat_with_tools(to_wire_messages(messages, &names), wire_tools, model)
            .await
            .inspect_err(|e| tracing::error!(target: "llm", error = %e, "LLM call failed"))?;

        let reply = to_reply(response, &names);
        tracing::info!(
            target: "llm",
            model = %reply.model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            tool_calls = reply.tool_calls.len(),
            "LLM call completed"
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{tool_call_message, ToolCallRecord};
    use serde_json::json;

    #[test]
    fn test_wire_name() {
        assert_eq!(wire_name("pyramids.create"), "pyramids_create");
        assert_eq!(wire_name("mcp:files:grep"), "mcp_files_grep");
        assert_eq!(wire_name(&"a".repeat(80)).len(), 64);
    }

    #[test]
    fn test_colliding_ids_get_distinct_wire_names() {
        let long_a = format!("mcp:srv:{}a", "x".repeat(70));
        let long_b = format!("mcp:srv:{}b", "x".repeat(70));
        let ids = ["mcp:srv:a.b", "mcp:srv:a_b", long_a.as_str(), long_b.as_str()];
        let names = WireNames::new(ids);

        let wires: Vec<String> = ids.iter().map(|id| names.wire(id)).collect();
        assert_eq!(wires[0], "mcp_srv_a_b");
        assert_eq!(wires[1], "mcp_srv_a_b_2");
        assert_ne!(wires[2], wires[3]);
        for (id, wire) in ids.iter().zip(&wires) {
            assert!(wire.len() <= MAX_WIRE_NAME_LEN);
            assert_eq!(names.tool(wire).map(String::as_str), Some(*id));
        }
    }

    #[test]
    fn test_replayed_tool_calls_use_wire_names() {
        let msg = tool_call_message(&[ToolCallRecord::new("pyramids.create", json!({}), "c1")]).unwrap();
        let wire = to_wire_messages(&[msg], &WireNames::new(["pyramids.create"]));
        match &wire[0] {
            ChatCompletionRequestMessage::Assistant(a) => {
                assert_eq!(a.tool_calls.as_ref().unwrap()[0].function.name, "pyramids_create");
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_to_reply_maps_names_back() {
        let response: CreateChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "pyramids_create", "arguments": "{\"title\":\"Q3\"}"}
                    }]
                }
            }]
        }))
        .unwrap();

        let reply = to_reply(response, &WireNames::new(["pyramids.create"]));

        assert_eq!(reply.model, "gpt-4o");
        assert_eq!(reply.content, "");
        assert_eq!(reply.tool_calls[0].name, "pyramids.create");
        assert_eq!(reply.tool_calls[0].args, json!({"title": "Q3"}));
    }
}
