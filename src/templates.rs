//! Handlebars templates for system prompts

use crate::error::{EngineError, Result};
use handlebars::Handlebars;
use serde::Serialize;
use std::sync::Arc;

const SYSTEM_PROMPT_TEMPLATE: &str = include_str!("templates/system_prompt.hbs");
const PLANNING_PROMPT_TEMPLATE: &str = include_str!("templates/planning_prompt.hbs");

/// Holds the handlebars templates
pub struct Templates {
    handlebars: Handlebars<'static>,
}

impl Templates {
    pub fn new() -> Result<Arc<Self>> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_helper("join", Box::new(join_helper));
        handlebars
            .register_template_string("system_prompt.hbs", SYSTEM_PROMPT_TEMPLATE)
            .map_err(|e| EngineError::Template(e.to_string()))?;
        handlebars
            .register_template_string("planning_prompt.hbs", PLANNING_PROMPT_TEMPLATE)
            .map_err(|e| EngineError::Template(e.to_string()))?;

        Ok(Arc::new(Self { handlebars }))
    }

    /// Render a template by name with the given data
    pub fn render<T: Serialize>(&self, template_name: &str, data: &T) -> Result<String> {
        Ok(self.handlebars.render(template_name, data)?)
    }
}

/// One app entry of the execution system prompt
#[derive(Serialize, Clone, Debug)]
pub struct AppSection {
    pub name: String,
    pub description: String,
    pub actions: Vec<String>,
    pub guidelines: String,
}

/// Data for the "Available Apps and Tools" block
#[derive(Serialize)]
pub struct SystemPromptTemplate {
    pub apps: Vec<AppSection>,
}

impl SystemPromptTemplate {
    pub fn render(&self, templates: &Templates) -> Result<String> {
        Ok(templates
            .render("system_prompt.hbs", self)?
            .trim_end()
            .to_string())
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct ToolLine {
    pub id: String,
    pub description: String,
}

/// Data for the planning system prompt
#[derive(Serialize)]
pub struct PlanningPromptTemplate {
    pub tools: Vec<ToolLine>,
}

impl PlanningPromptTemplate {
    pub fn render(&self, templates: &Templates) -> Result<String> {
        Ok(templates
            .render("planning_prompt.hbs", self)?
            .trim_end()
            .to_string())
    }
}

// Join an array of strings with a separator
handlebars::handlebars_helper!(join_helper: |arr: Json, sep: str| {
    arr.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(sep)
        })
        .unwrap_or_default()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_template() {
        let templates = Templates::new().unwrap();
        let template = SystemPromptTemplate {
            apps: vec![
                AppSection {
                    name: "Pyramid Solver".to_string(),
                    description: "Structured problem solving".to_string(),
                    actions: vec!["create".to_string(), "read".to_string()],
                    guidelines: "Use for <complex> problems & trade-offs".to_string(),
                },
                AppSection {
                    name: "Diagrams".to_string(),
                    description: "Mermaid diagrams".to_string(),
                    actions: vec!["list".to_string()],
                    guidelines: "Keep them small".to_string(),
                },
            ],
        };
        let rendered = template.render(&templates).unwrap();
        assert!(rendered.starts_with("## Available Apps and Tools"));
        assert!(rendered.contains("### Pyramid Solver\nStructured problem solving\n"));
        assert!(rendered.contains("Available actions: create, read\n"));
        // no HTML escaping
        assert!(rendered.contains("Guidelines: Use for <complex> problems & trade-offs"));
        assert!(rendered.ends_with("Guidelines: Keep them small"));
    }

    #[test]
    fn test_planning_prompt_lists_tools() {
        let templates = Templates::new().unwrap();
        let rendered = PlanningPromptTemplate {
            tools: vec![ToolLine {
                id: "pyramids.create".to_string(),
                description: "Create a new pyramid".to_string(),
            }],
        }
        .render(&templates)
        .unwrap();
        assert!(rendered.starts_with("You are a planning assistant."));
        assert!(rendered.contains("\"tool_id\": \"app.action or null\""));
        assert!(rendered.contains("- pyramids.create: Create a new pyramid"));
        assert!(!rendered.contains("No tools available."));
    }

    #[test]
    fn test_planning_prompt_without_tools() {
        let templates = Templates::new().unwrap();
        let rendered = PlanningPromptTemplate { tools: vec![] }
            .render(&templates)
            .unwrap();
        assert!(rendered.contains("Available tools:"));
        assert!(rendered.ends_with("No tools available."));
    }
}
