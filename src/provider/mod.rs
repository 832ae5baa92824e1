//! LLM Provider layer
//!
//! `LanguageModel` is the seam the engine calls; `ProviderClient` implements
//! it for any API that follows the OpenAI chat completions spec.

mod client;
mod config;
mod model;
mod scripted;

pub use client::*;
pub use config::*;
pub use model::*;
pub use scripted::*;
