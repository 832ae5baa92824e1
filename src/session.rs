//! Session service
//!
//! Sessions are stored whole in the `sessions` collection. Every mutation is
//! a fetch-modify-write of one document, so concurrent writers to the same
//! session race and the last write wins.

use crate::error::{EngineError, Result};
use crate::message::{MessageRole, SessionMessage};
use crate::planning::Plan;
use crate::store::{new_document_id, Document, DocumentStore, Fields};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

pub const SESSIONS_COLLECTION: &str = "sessions";

const DEFAULT_LIST_LIMIT: usize = 50;
const TITLE_MAX_CHARS: usize = 60;

/// Current UTC time, RFC 3339 with fixed microsecond precision so that
/// timestamps sort lexically
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Paused,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "paused" => Ok(SessionStatus::Paused),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(EngineError::Invalid(format!(
                "Invalid status '{}'. Must be one of: active, completed, paused",
                other
            ))),
        }
    }
}

/// A conversation between a user and one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub workspace_id: String,
    pub agent_id: String,
    pub user_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    #[serde(default)]
    pub metadata: Fields,
    #[serde(default)]
    pub parent_session_id: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Session {
    pub fn from_document(doc: Document) -> Result<Self> {
        let mut session: Session = serde_json::from_value(Value::Object(doc.fields))
            .map_err(|e| EngineError::Invalid(format!("Malformed session '{}': {}", doc.id, e)))?;
        session.id = doc.id;
        Ok(session)
    }

    pub fn is_chat_only(&self) -> bool {
        self.metadata
            .get("chatOnly")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    fn to_fields(&self) -> Fields {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Fields::new(),
        }
    }
}

/// Parameters for a new session
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub workspace_id: String,
    pub agent_id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub parent_session_id: Option<String>,
    pub chat_only: bool,
}

/// Title derived from the first user message
pub fn generate_title(first_message: &str) -> String {
    let title = first_message.trim();
    if title.chars().count() > TITLE_MAX_CHARS {
        let truncated: String = title.chars().take(TITLE_MAX_CHARS - 3).collect();
        format!("{}...", truncated)
    } else {
        title.to_string()
    }
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn DocumentStore>,
}

impl SessionService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn create(&self, params: NewSession) -> Result<Session> {
        let now = now_timestamp();
        let mut metadata = Fields::new();
        if params.chat_only {
            metadata.insert("chatOnly".to_string(), Value::Bool(true));
        }

        let session = Session {
            id: new_document_id(),
            workspace_id: params.workspace_id,
            agent_id: params.agent_id,
            user_id: params.user_id,
            title: params.title,
            status: SessionStatus::Active,
            messages: Vec::new(),
            metadata,
            parent_session_id: params.parent_session_id,
            created_at: now.clone(),
            updated_at: now,
        };
        self.store
            .set(SESSIONS_COLLECTION, &session.id, session.to_fields())?;
        debug!(session_id = %session.id, agent_id = %session.agent_id, "Created session");
        Ok(session)
    }

    pub fn get(&self, session_id: &str) -> Result<Session> {
        let doc = self
            .store
            .get(SESSIONS_COLLECTION, session_id)?
            .ok_or_else(|| EngineError::not_found("session", session_id))?;
        Session::from_document(doc)
    }

    /// Sessions of a workspace, most recently updated first
    pub fn list(
        &self,
        workspace_id: &str,
        agent_id: Option<&str>,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>> {
        let docs = self.store.list_where(
            SESSIONS_COLLECTION,
            "workspaceId",
            &Value::String(workspace_id.to_string()),
        )?;

        let mut sessions = Vec::new();
        for doc in docs.into_iter().rev() {
            let session = Session::from_document(doc)?;
            if agent_id.is_some_and(|a| a != session.agent_id) {
                continue;
            }
            if status.is_some_and(|s| s != session.status) {
                continue;
            }
            sessions.push(session);
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions.truncate(DEFAULT_LIST_LIMIT);
        Ok(sessions)
    }

    /// Append a transcript entry
    pub fn add_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: impl Into<String>,
        metadata: Fields,
    ) -> Result<SessionMessage> {
        let mut session = self.get(session_id)?;
        let message = SessionMessage::new(role, content, metadata);
        session.messages.push(message.clone());

        let mut fields = Fields::new();
        fields.insert("messages".to_string(), serde_json::to_value(&session.messages)?);
        fields.insert("updatedAt".to_string(), Value::String(now_timestamp()));
        self.store.update(SESSIONS_COLLECTION, session_id, fields)?;
        Ok(message)
    }

    /// Change status; `completed` is terminal
    pub fn update_status(&self, session_id: &str, status: SessionStatus) -> Result<Session> {
        let session = self.get(session_id)?;
        if session.status == SessionStatus::Completed && status != SessionStatus::Completed {
            return Err(EngineError::transition(
                "Cannot change status of a completed session",
            ));
        }
        self.update_fields(
            session_id,
            json!({ "status": status.as_str(), "updatedAt": now_timestamp() }),
        )?;
        self.get(session_id)
    }

    pub fn set_title(&self, session_id: &str, title: &str) -> Result<()> {
        self.update_fields(
            session_id,
            json!({ "title": title, "updatedAt": now_timestamp() }),
        )
    }

    pub fn delete(&self, session_id: &str) -> Result<()> {
        self.get(session_id)?;
        self.store.delete(SESSIONS_COLLECTION, session_id)
    }

    /// Replace the session's plan wholesale
    pub fn store_plan(&self, session_id: &str, plan: &Plan) -> Result<()> {
        let session = self.get(session_id)?;
        let mut metadata = session.metadata;
        metadata.insert("plan".to_string(), serde_json::to_value(plan)?);

        let mut fields = Fields::new();
        fields.insert("metadata".to_string(), Value::Object(metadata));
        fields.insert("updatedAt".to_string(), Value::String(now_timestamp()));
        self.store.update(SESSIONS_COLLECTION, session_id, fields)
    }

    pub fn get_plan(&self, session_id: &str) -> Result<Option<Plan>> {
        let session = self.get(session_id)?;
        match session.metadata.get("plan") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }

    /// Number of ancestors above this session
    pub fn delegation_depth(&self, session_id: &str) -> Result<usize> {
        let mut depth = 0;
        let mut seen = HashSet::new();
        seen.insert(session_id.to_string());

        let mut current = self.get(session_id)?.parent_session_id;
        while let Some(parent_id) = current {
            if !seen.insert(parent_id.clone()) {
                break;
            }
            match self.store.get(SESSIONS_COLLECTION, &parent_id)? {
                Some(doc) => {
                    depth += 1;
                    current = doc
                        .get_str("parentSessionId")
                        .map(|s| s.to_string());
                }
                None => break,
            }
        }
        Ok(depth)
    }

    fn update_fields(&self, session_id: &str, fields: Value) -> Result<()> {
        self.store
            .update(SESSIONS_COLLECTION, session_id, crate::store::fields_from(fields))
            .map_err(|e| match e {
                EngineError::NotFound { .. } => EngineError::not_found("session", session_id),
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> SessionService {
        SessionService::new(Arc::new(MemoryStore::new()))
    }

    fn new_session(service: &SessionService, parent: Option<&str>) -> Session {
        service
            .create(NewSession {
                workspace_id: "ws-1".to_string(),
                agent_id: "agent-1".to_string(),
                user_id: "user-1".to_string(),
                parent_session_id: parent.map(|p| p.to_string()),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let service = service();
        let created = service
            .create(NewSession {
                workspace_id: "ws-1".to_string(),
                agent_id: "agent-1".to_string(),
                user_id: "user-1".to_string(),
                chat_only: true,
                ..Default::default()
            })
            .unwrap();

        let loaded = service.get(&created.id).unwrap();
        assert_eq!(loaded, created);
        assert!(loaded.is_chat_only());
        assert!(loaded.is_active());
        assert!(loaded.title.is_none());
    }

    #[test]
    fn test_get_missing_session() {
        let err = service().get("nope").unwrap_err();
        assert_eq!(err.code(), "SESSION_NOT_FOUND");
    }

    #[test]
    fn test_add_message_appends() {
        let service = service();
        let session = new_session(&service, None);

        service
            .add_message(&session.id, MessageRole::User, "hi", Fields::new())
            .unwrap();
        service
            .add_message(&session.id, MessageRole::Assistant, "hello", Fields::new())
            .unwrap();

        let messages = service.get(&session.id).unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].content, "hello");
    }

    #[test]
    fn test_completed_is_terminal() {
        let service = service();
        let session = new_session(&service, None);

        service.update_status(&session.id, SessionStatus::Paused).unwrap();
        service.update_status(&session.id, SessionStatus::Completed).unwrap();
        service.update_status(&session.id, SessionStatus::Completed).unwrap();

        let err = service
            .update_status(&session.id, SessionStatus::Active)
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot change status of a completed session");
        assert_eq!(err.code(), "INVALID_STATE_TRANSITION");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("paused".parse::<SessionStatus>().unwrap(), SessionStatus::Paused);
        let err = "archived".parse::<SessionStatus>().unwrap_err();
        assert!(err.to_string().contains("Invalid status 'archived'"));
    }

    #[test]
    fn test_list_filters_and_orders() {
        let service = service();
        let first = new_session(&service, None);
        let second = new_session(&service, None);
        std::thread::sleep(std::time::Duration::from_millis(2));
        service.update_status(&first.id, SessionStatus::Paused).unwrap();

        let all = service.list("ws-1", None, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);

        let active = service.list("ws-1", None, Some(SessionStatus::Active)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);

        assert!(service.list("ws-1", Some("other"), None).unwrap().is_empty());
        assert!(service.list("ws-2", None, None).unwrap().is_empty());
    }

    #[test]
    fn test_generate_title() {
        assert_eq!(generate_title("  Build a roadmap  "), "Build a roadmap");

        let long = "x".repeat(61);
        let title = generate_title(&long);
        assert_eq!(title.chars().count(), 60);
        assert!(title.ends_with("..."));

        let exact = "y".repeat(60);
        assert_eq!(generate_title(&exact), exact);
    }

    #[test]
    fn test_delegation_depth_follows_ancestry() {
        let service = service();
        let root = new_session(&service, None);
        let child = new_session(&service, Some(&root.id));
        let grandchild = new_session(&service, Some(&child.id));

        assert_eq!(service.delegation_depth(&root.id).unwrap(), 0);
        assert_eq!(service.delegation_depth(&child.id).unwrap(), 1);
        assert_eq!(service.delegation_depth(&grandchild.id).unwrap(), 2);
    }

    #[test]
    fn test_delete_session() {
        let service = service();
        let session = new_session(&service, None);
        service.delete(&session.id).unwrap();
        assert!(service.get(&session.id).is_err());
        assert!(service.delete(&session.id).is_err());
    }
}
