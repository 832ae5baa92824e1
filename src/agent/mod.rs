//! Agent system
//!
//! - `Agent`: typed capability profile (grants, orchestration policy, context)
//! - `PermissionResolver`: grants to concrete tool sets
//! - `ExecutionEngine`: the tool-calling loop over a session transcript
//! - `AgentDirectory`: stored profiles, default manager, YAML seeding

mod builtins;
mod config;
mod config_loader;
mod engine;
mod permissions;
pub mod prompt;
mod registry;

pub use builtins::{default_manager, DEFAULT_MANAGER_NAME};
pub use config::*;
pub use config_loader::{load_agent_profiles, load_profile_file, profile_path, save_profile_file};
pub use engine::*;
pub use permissions::*;
pub use prompt::{build_chat_prompt, build_planning_prompt, build_system_prompt};
pub use registry::{AgentDirectory, AGENTS_COLLECTION};
