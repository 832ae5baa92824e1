//! Provider configuration

use serde::{Deserialize, Serialize};

/// Configuration for an OpenAI-compatible provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name for the provider
    pub name: String,
    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,
    /// Environment variable name for the API key
    pub api_key_env: String,
    /// Default model to use
    pub default_model: String,
}

impl ProviderConfig {
    /// Create an OpenAI provider config
    pub fn openai() -> Self {
        Self::custom("OpenAI", "https://api.openai.com/v1", "OPENAI_API_KEY", "gpt-4.1-mini")
    }

    /// Create an Anthropic provider config (via their OpenAI-compatible endpoint)
    pub fn anthropic() -> Self {
        Self::custom(
            "Anthropic",
            "https://api.anthropic.com/v1",
            "ANTHROPIC_API_KEY",
            "claude-3-5-sonnet-20241022",
        )
    }

    pub fn gemini() -> Self {
        Self::custom(
            "Gemini",
            "https://generativelanguage.googleapis.com/v1beta/openai",
            "GEMINI_API_KEY",
            "gemini-1.5-pro",
        )
    }

    pub fn grok() -> Self {
        Self::custom("Grok", "https://api.x.ai/v1", "GROK_API_KEY", "grok-beta")
    }

    pub fn deepseek() -> Self {
        Self::custom(
            "DeepSeek",
            "https://api.deepseek.com/v1",
            "DEEPSEEK_API_KEY",
            "deepseek-chat",
        )
    }

    /// Create an OpenRouter provider config
    pub fn openrouter() -> Self {
        Self::custom(
            "OpenRouter",
            "https://openrouter.ai/api/v1",
            "OPENROUTER_API_KEY",
            "anthropic/claude-3.5-sonnet",
        )
    }

    /// Create a custom provider config (e.g., LM Studio, vLLM)
    pub fn custom(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key_env: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key_env: api_key_env.into(),
            default_model: default_model.into(),
        }
    }

    /// Preset by provider name, case-insensitive
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "openai" => Some(Self::openai()),
            "anthropic" => Some(Self::anthropic()),
            "gemini" => Some(Self::gemini()),
            "grok" => Some(Self::grok()),
            "deepseek" => Some(Self::deepseek()),
            "openrouter" => Some(Self::openrouter()),
            _ => None,
        }
    }
}
