//! System prompt construction for agents
//!
//! Prompts are assembled from parts joined by a blank line: the agent's own
//! context, the rendered app block and any caller-supplied context.

use super::config::Agent;
use super::permissions::AppAccess;
use crate::error::Result;
use crate::templates::{AppSection, PlanningPromptTemplate, SystemPromptTemplate, Templates, ToolLine};
use crate::tool::ToolDefinition;

fn additional_context(context: Option<&str>) -> Option<String> {
    context
        .filter(|c| !c.is_empty())
        .map(|c| format!("Additional context:\n{}", c))
}

/// System prompt for a tool-using turn
pub fn build_system_prompt(
    templates: &Templates,
    agent: &Agent,
    apps: &[AppAccess<'_>],
    context: Option<&str>,
) -> Result<String> {
    let mut parts = Vec::new();

    if !agent.system_context().is_empty() {
        parts.push(agent.system_context().to_string());
    }

    if !apps.is_empty() {
        let template = SystemPromptTemplate {
            apps: apps
                .iter()
                .map(|access| AppSection {
                    name: access.app.name.clone(),
                    description: access.app.description.clone(),
                    actions: access.actions.iter().map(|a| a.to_string()).collect(),
                    guidelines: access.app.usage_guidelines.clone(),
                })
                .collect(),
        };
        parts.push(template.render(templates)?);
    }

    parts.extend(additional_context(context));
    Ok(parts.join("\n\n"))
}

/// System prompt for a plain chat turn (no tools bound)
pub fn build_chat_prompt(agent: &Agent, context: Option<&str>) -> String {
    let mut parts = Vec::new();
    if !agent.system_context().is_empty() {
        parts.push(agent.system_context().to_string());
    }
    parts.extend(additional_context(context));
    parts.join("\n\n")
}

/// System prompt asking the model for a JSON plan over the given tools
pub fn build_planning_prompt(
    templates: &Templates,
    tools: &[ToolDefinition],
    context: Option<&str>,
) -> Result<String> {
    let base = PlanningPromptTemplate {
        tools: tools
            .iter()
            .map(|t| ToolLine {
                id: t.tool_id.clone(),
                description: t.description.clone(),
            })
            .collect(),
    }
    .render(templates)?;

    Ok(match additional_context(context) {
        Some(extra) => format!("{}\n\n{}", base, extra),
        None => base,
    })
}
