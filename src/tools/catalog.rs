//! Reference catalog: eight document apps with full CRUD tool sets

use super::crud::{CollectionSpec, CrudHandler};
use crate::store::fields_from;
use crate::tool::{AppDefinition, ToolAction, ToolDefinition};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Static description of one catalog app
struct AppEntry {
    app_id: &'static str,
    name: &'static str,
    /// Singular noun used in tool names ("Pyramid")
    noun: &'static str,
    /// Plural noun used in list tool names ("Pyramids")
    plural: &'static str,
    collection: &'static str,
    description: &'static str,
    guidelines: &'static str,
    examples: &'static [&'static str],
    /// Optional create arguments besides `title`
    create_args: &'static [(&'static str, &'static str, &'static str)],
    defaults: fn() -> Value,
    updatable: &'static [&'static str],
}

fn entries() -> [AppEntry; 8] {
    [
        AppEntry {
            app_id: "pyramids",
            name: "Pyramids",
            noun: "Pyramid",
            plural: "Pyramids",
            collection: "pyramids",
            description: "Pyramids is a visual brainstorming tool. A pyramid starts from a root question; \
                answers spawn follow-up questions, forming a tree of question and answer blocks linked \
                through the connections array. Context sources can be linked from other apps.",
            guidelines: "Use pyramids when users want to brainstorm, explore a problem or build a decision tree. \
                Create a new pyramid per problem, update blocks as questions and answers are refined, \
                and read existing pyramids for brainstorming context.",
            examples: &[
                "Create a new pyramid to explore our authentication approach",
                "What pyramids do I have in this workspace?",
                "Update the root question of my pyramid",
            ],
            create_args: &[("context", "string", "Problem context")],
            defaults: || json!({"context": null, "blocks": {}, "connections": [], "contextSources": [], "status": "active"}),
            updatable: &["title", "context", "blocks", "connections", "contextSources", "status"],
        },
        AppEntry {
            app_id: "product_definitions",
            name: "Product Definitions",
            noun: "Product Definition",
            plural: "Product Definitions",
            collection: "productDefinitions",
            description: "Product Definitions holds structured product plans: a tree of nodes in the `data` \
                field describing features, requirements, user stories and market analysis. A definition \
                can be linked to a pyramid for context tracing.",
            guidelines: "Use product definitions to capture what is being built and why. Link them to the \
                pyramid they came from when one exists.",
            examples: &[
                "Create a product definition for the authentication module",
                "Link this product definition to my brainstorming pyramid",
            ],
            create_args: &[("linkedPyramidId", "string", "Optional pyramid ID to link")],
            defaults: || json!({"data": {}, "linkedPyramidId": null, "contextSources": []}),
            updatable: &["title", "data", "linkedPyramidId", "contextSources"],
        },
        AppEntry {
            app_id: "technical_architectures",
            name: "Technical Architectures",
            noun: "Technical Architecture",
            plural: "Technical Architectures",
            collection: "technicalArchitectures",
            description: "Technical Architectures holds system design documents with nested content \
                sections: system architecture, technology stack, code organization, design patterns \
                and API standards.",
            guidelines: "Use technical architectures for system design documentation. Update individual \
                content sections when decisions change and read them before proposing changes.",
            examples: &[
                "Create a technical architecture for the new microservice",
                "Update the technology stack section",
            ],
            create_args: &[("content", "object", "Initial content sections")],
            defaults: || json!({"content": {}, "contextSources": []}),
            updatable: &["title", "content", "contextSources"],
        },
        AppEntry {
            app_id: "technical_tasks",
            name: "Technical Tasks",
            noun: "Technical Task",
            plural: "Technical Tasks",
            collection: "technicalTasks",
            description: "Technical Tasks is a kanban-style task tracker. Tasks have a title, description, \
                status (todo/in_progress/done), priority and an optional assignee.",
            guidelines: "Use technical tasks to track work items. Create tasks when work is identified, \
                update status as it progresses and list tasks to review the workload.",
            examples: &[
                "Create a task to implement user authentication",
                "Mark the login task as done",
            ],
            create_args: &[
                ("description", "string", "Task details"),
                ("status", "string", "todo, in_progress or done"),
                ("priority", "string", "low, medium or high"),
            ],
            defaults: || json!({"description": "", "status": "todo", "priority": "medium", "assignee": null, "contextSources": []}),
            updatable: &["title", "description", "status", "priority", "assignee", "contextSources"],
        },
        AppEntry {
            app_id: "diagrams",
            name: "Diagrams",
            noun: "Diagram",
            plural: "Diagrams",
            collection: "diagrams",
            description: "Diagrams stores visual diagrams of flows, data models and architecture. Content \
                is usually Mermaid syntax; diagramType records the flavour.",
            guidelines: "Use diagrams for visual representations of systems. Update the content when the \
                architecture it depicts changes.",
            examples: &["Create a sequence diagram for the login flow", "List all diagrams"],
            create_args: &[
                ("content", "string", "Diagram content (Mermaid syntax)"),
                ("diagramType", "string", "Diagram type"),
            ],
            defaults: || json!({"content": "", "diagramType": "mermaid", "contextSources": []}),
            updatable: &["title", "content", "diagramType", "contextSources"],
        },
        AppEntry {
            app_id: "ui_ux_architectures",
            name: "UI/UX Architectures",
            noun: "UI/UX Architecture",
            plural: "UI/UX Architectures",
            collection: "uiUxArchitectures",
            description: "UI/UX Architectures documents interface design: pages (screens), themes \
                (visual styling) and reusable components.",
            guidelines: "Use UI/UX architectures to document interfaces. Add pages for screens, themes for \
                styles and components for reusable elements.",
            examples: &["Create a UI architecture for the dashboard", "Update the theme colors"],
            create_args: &[],
            defaults: || json!({"pages": {}, "themes": {}, "components": {}, "contextSources": []}),
            updatable: &["title", "pages", "themes", "components", "contextSources"],
        },
        AppEntry {
            app_id: "context_documents",
            name: "Context Documents",
            noun: "Context Document",
            plural: "Context Documents",
            collection: "contextDocuments",
            description: "Context Documents is a knowledge base of free-form text or markdown documents \
                used as background context for other apps and conversations.",
            guidelines: "Use context documents for background information, requirements and meeting notes. \
                They can be linked as context sources elsewhere.",
            examples: &[
                "Create a context document with the project requirements",
                "Read the requirements document",
            ],
            create_args: &[("content", "string", "Document content")],
            defaults: || json!({"content": ""}),
            updatable: &["title", "content"],
        },
        AppEntry {
            app_id: "pipelines",
            name: "Pipelines",
            noun: "Pipeline",
            plural: "Pipelines",
            collection: "pipelines",
            description: "Pipelines defines sequential workflows as ordered stages: CI/CD, deployment, \
                data processing or any multi-step process.",
            guidelines: "Use pipelines to define sequential workflows. Add a stage per step and update \
                stage configuration as requirements change.",
            examples: &["Create a deployment pipeline", "Add a testing stage to the pipeline"],
            create_args: &[("stages", "array", "Initial stages")],
            defaults: || json!({"stages": [], "status": "draft", "contextSources": []}),
            updatable: &["title", "stages", "status", "contextSources"],
        },
    ]
}

/// Build every catalog app, handlers included
pub fn catalog_apps() -> Vec<AppDefinition> {
    entries().iter().map(build_app).collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        _ => "string",
    }
}

fn id_schema(noun: &str) -> Value {
    json!({
        "type": "object",
        "properties": {"id": {"type": "string", "description": format!("{} document ID", noun)}},
        "required": ["id"],
    })
}

fn build_app(entry: &AppEntry) -> AppDefinition {
    let defaults = (entry.defaults)();
    let spec = Arc::new(CollectionSpec {
        app_id: entry.app_id.to_string(),
        collection: entry.collection.to_string(),
        create_defaults: fields_from(defaults.clone()),
        updatable_fields: entry.updatable.iter().map(|s| s.to_string()).collect(),
    });

    let mut create_props = Map::new();
    create_props.insert(
        "title".into(),
        json!({"type": "string", "description": format!("{} title", entry.noun)}),
    );
    for (name, ty, desc) in entry.create_args {
        create_props.insert((*name).into(), json!({"type": ty, "description": desc}));
    }

    let mut update_props = Map::new();
    update_props.insert(
        "id".into(),
        json!({"type": "string", "description": format!("{} document ID", entry.noun)}),
    );
    for field in entry.updatable {
        let ty = defaults.get(*field).map(json_type).unwrap_or("string");
        update_props.insert((*field).into(), json!({ "type": ty }));
    }

    let lower = entry.noun.to_lowercase();
    let handler = |action| Arc::new(CrudHandler::new(spec.clone(), action));

    let tools = vec![
        ToolDefinition::new(
            entry.app_id,
            ToolAction::Create,
            format!("Create {}", entry.noun),
            format!("Creates a new {}", lower),
            json!({"type": "object", "properties": create_props, "required": ["title"]}),
            handler(ToolAction::Create),
        ),
        ToolDefinition::new(
            entry.app_id,
            ToolAction::Read,
            format!("Read {}", entry.noun),
            format!("Reads a {} by ID", lower),
            id_schema(entry.noun),
            handler(ToolAction::Read),
        ),
        ToolDefinition::new(
            entry.app_id,
            ToolAction::Update,
            format!("Update {}", entry.noun),
            format!("Updates a {}: {}", lower, entry.updatable.join(", ")),
            json!({"type": "object", "properties": update_props, "required": ["id"]}),
            handler(ToolAction::Update),
        ),
        ToolDefinition::new(
            entry.app_id,
            ToolAction::Delete,
            format!("Delete {}", entry.noun),
            format!("Deletes a {} by ID", lower),
            id_schema(entry.noun),
            handler(ToolAction::Delete),
        ),
        ToolDefinition::new(
            entry.app_id,
            ToolAction::List,
            format!("List {}", entry.plural),
            format!("Lists all {} in the workspace", entry.plural.to_lowercase()),
            json!({"type": "object", "properties": {}}),
            handler(ToolAction::List),
        ),
    ];

    let mut schema_props = Map::new();
    schema_props.insert("title".into(), json!({"type": "string"}));
    if let Value::Object(map) = &defaults {
        for (key, value) in map {
            schema_props.insert(key.clone(), json!({ "type": json_type(value) }));
        }
    }

    AppDefinition {
        app_id: entry.app_id.to_string(),
        name: entry.name.to_string(),
        collection: entry.collection.to_string(),
        description: entry.description.to_string(),
        data_schema: json!({"type": "object", "properties": schema_props}),
        usage_guidelines: entry.guidelines.to_string(),
        example_prompts: entry.examples.iter().map(|s| s.to_string()).collect(),
        tools,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_shape() {
        let apps = catalog_apps();
        assert_eq!(apps.len(), 8);
        for app in &apps {
            assert_eq!(app.tools.len(), 5);
            assert_eq!(app.available_actions(), ToolAction::ALL.to_vec());
            for tool in &app.tools {
                assert!(tool.has_valid_id(), "bad id {}", tool.tool_id);
                assert_eq!(tool.parameters["type"], "object");
            }
        }
    }

    #[test]
    fn test_tool_names_and_schemas() {
        let apps = catalog_apps();
        let pyramids = apps.iter().find(|a| a.app_id == "pyramids").unwrap();
        let create = &pyramids.tools[0];
        assert_eq!(create.tool_id, "pyramids.create");
        assert_eq!(create.name, "Create Pyramid");
        assert_eq!(create.parameters["required"], json!(["title"]));

        let update = &pyramids.tools[2];
        assert_eq!(update.parameters["properties"]["blocks"]["type"], "object");
        assert_eq!(update.parameters["properties"]["connections"]["type"], "array");

        let list = &pyramids.tools[4];
        assert_eq!(list.name, "List Pyramids");
    }
}
