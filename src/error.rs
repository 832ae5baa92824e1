//! Engine error taxonomy
//!
//! Only faults that make a whole call illegal live here. Per-tool failures
//! (permission denied, handler faults) are carried as `ToolOutcome`s instead.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A session, agent, tool, app or document is missing
    #[error("{resource} '{id}' not found")]
    NotFound { resource: String, id: String },

    #[error("No plan found in session")]
    NoPlan,

    /// Plan, step or session moved from a status that forbids the request
    #[error("{0}")]
    InvalidStateTransition(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Invalid(String),

    #[error("Language model call failed: {0}")]
    LanguageModel(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn transition(message: impl Into<String>) -> Self {
        Self::InvalidStateTransition(message.into())
    }

    /// Stable machine-readable code for callers at the boundary
    pub fn code(&self) -> String {
        match self {
            EngineError::NotFound { resource, .. } => {
                format!("{}_NOT_FOUND", resource.to_uppercase())
            }
            EngineError::NoPlan => "NO_PLAN".to_string(),
            EngineError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION".to_string(),
            EngineError::Forbidden(_) => "FORBIDDEN".to_string(),
            EngineError::Invalid(_) => "INVALID_REQUEST".to_string(),
            EngineError::LanguageModel(_) => "LLM_ERROR".to_string(),
            EngineError::Store(_) => "STORE_ERROR".to_string(),
            EngineError::Template(_) => "TEMPLATE_ERROR".to_string(),
            EngineError::Config(_) => "CONFIG_ERROR".to_string(),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Store(format!("invalid document body: {}", e))
    }
}

impl From<handlebars::RenderError> for EngineError {
    fn from(e: handlebars::RenderError) -> Self {
        EngineError::Template(e.to_string())
    }
}
