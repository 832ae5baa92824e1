//! Two-stage parser for model-written plans
//!
//! Stage one parses the whole reply as JSON. Stage two extracts the first
//! fenced code block and parses that. When both fail the caller gets an
//! `EmptyFallback` carrying the reason, so degradation is never silent.

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::OnceLock;

/// Plan as the model wrote it, before defaults and validation
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DraftPlan {
    #[serde(default, deserialize_with = "text")]
    pub goal: Option<String>,
    #[serde(default)]
    pub steps: Vec<DraftStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DraftStep {
    /// Models often number their steps; numbers are kept as text
    #[serde(default, deserialize_with = "text_or_number")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub tool_id: Option<String>,
    #[serde(default)]
    pub args: Option<Value>,
}

/// String field; any other JSON type counts as missing
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn text_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanParse {
    /// The reply was the JSON plan itself
    Direct(DraftPlan),
    /// The plan was found inside a fenced code block
    Fenced(DraftPlan),
    /// Nothing usable; the caller builds a zero-step plan
    EmptyFallback { reason: String },
}

impl PlanParse {
    pub fn is_fallback(&self) -> bool {
        matches!(self, PlanParse::EmptyFallback { .. })
    }

    pub fn into_draft(self) -> Option<DraftPlan> {
        match self {
            PlanParse::Direct(draft) | PlanParse::Fenced(draft) => Some(draft),
            PlanParse::EmptyFallback { .. } => None,
        }
    }
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").ok())
        .as_ref()
}

pub fn parse_plan_reply(content: &str) -> PlanParse {
    let direct_err = match serde_json::from_str::<DraftPlan>(content.trim()) {
        Ok(draft) => return PlanParse::Direct(draft),
        Err(e) => e,
    };

    let Some(block) = fence_regex()
        .and_then(|re| re.captures(content))
        .and_then(|caps| caps.get(1))
    else {
        return PlanParse::EmptyFallback {
            reason: format!("reply is not JSON and has no code block: {}", direct_err),
        };
    };

    match serde_json::from_str::<DraftPlan>(block.as_str().trim()) {
        Ok(draft) => PlanParse::Fenced(draft),
        Err(e) => PlanParse::EmptyFallback {
            reason: format!("code block is not a valid plan: {}", e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_json() {
        let parsed = parse_plan_reply(
            r#"{"goal": "Set up", "steps": [{"id": "a", "description": "Create", "tool_id": "pyramids.create", "args": {"title": "X"}}]}"#,
        );
        let PlanParse::Direct(draft) = parsed else {
            panic!("expected direct parse, got {:?}", parsed);
        };
        assert_eq!(draft.goal.as_deref(), Some("Set up"));
        assert_eq!(draft.steps[0].args, Some(json!({"title": "X"})));
    }

    #[test]
    fn test_fenced_block() {
        let reply = "Here is the plan:\n```json\n{\"goal\": \"G\", \"steps\": [{\"description\": \"think\"}]}\n```\nGood luck.";
        let parsed = parse_plan_reply(reply);
        assert!(matches!(parsed, PlanParse::Fenced(_)));
        let draft = parsed.into_draft().unwrap();
        assert_eq!(draft.steps.len(), 1);
        assert!(draft.steps[0].id.is_none());
    }

    #[test]
    fn test_unlabelled_fence() {
        let parsed = parse_plan_reply("```\n{\"steps\": []}\n```");
        assert_eq!(parsed, PlanParse::Fenced(DraftPlan::default()));
    }

    #[test]
    fn test_numbered_steps_and_odd_field_types() {
        let parsed = parse_plan_reply(
            r#"{"goal": "G", "steps": [
                {"id": 1, "description": "Create", "tool_id": "pyramids.create", "args": {"title": "X"}},
                {"id": 2.5, "description": ["not", "text"], "tool_id": false},
                {"id": null, "description": "Wrap up"}
            ]}"#,
        );
        let PlanParse::Direct(draft) = parsed else {
            panic!("expected direct parse, got {:?}", parsed);
        };
        assert_eq!(draft.steps.len(), 3);
        assert_eq!(draft.steps[0].id.as_deref(), Some("1"));
        assert_eq!(draft.steps[0].tool_id.as_deref(), Some("pyramids.create"));
        assert_eq!(draft.steps[1].id.as_deref(), Some("2.5"));
        assert_eq!(draft.steps[1].description, None);
        assert_eq!(draft.steps[1].tool_id, None);
        assert_eq!(draft.steps[2].id, None);
    }

    #[test]
    fn test_fallbacks_carry_reason() {
        let prose = parse_plan_reply("I would start by creating a pyramid.");
        assert!(prose.is_fallback());

        let broken = parse_plan_reply("```json\n{\"goal\": \n```");
        match broken {
            PlanParse::EmptyFallback { reason } => assert!(reason.contains("code block")),
            other => panic!("expected fallback, got {:?}", other),
        }
    }
}
