//! Generic CRUD handlers over one document collection

use crate::error::Result;
use crate::store::{fields_from, Fields};
use crate::tool::{ToolAction, ToolContext, ToolHandler, ToolOutcome};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Set from the caller context on create, never from tool arguments
const OWNER_FIELDS: [&str; 2] = ["userId", "workspaceId"];

/// How one app maps onto its collection
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub app_id: String,
    pub collection: String,
    /// Fields every new document starts with (arguments override them)
    pub create_defaults: Fields,
    /// Fields `update` may touch; everything else is dropped
    pub updatable_fields: Vec<String>,
}

/// Handler for one CRUD action of one app
pub struct CrudHandler {
    spec: Arc<CollectionSpec>,
    action: ToolAction,
}

impl CrudHandler {
    pub fn new(spec: Arc<CollectionSpec>, action: ToolAction) -> Self {
        Self { spec, action }
    }

    fn now() -> Value {
        Value::String(chrono::Utc::now().to_rfc3339())
    }

    fn create(&self, ctx: &ToolContext, args: Fields) -> Result<ToolOutcome> {
        if !args.get("title").map(|t| t.is_string()).unwrap_or(false) {
            return Ok(ToolOutcome::failure("Missing required field 'title'"));
        }

        let now = Self::now();
        let mut doc = Fields::new();
        doc.insert("userId".into(), json!(ctx.user_id));
        doc.insert("workspaceId".into(), json!(ctx.workspace_id));
        doc.insert("createdAt".into(), now.clone());
        doc.insert("updatedAt".into(), now);
        for (key, value) in &self.spec.create_defaults {
            doc.insert(key.clone(), value.clone());
        }
        for (key, value) in args {
            if !OWNER_FIELDS.contains(&key.as_str()) {
                doc.insert(key, value);
            }
        }

        let id = ctx.store.create(&self.spec.collection, doc.clone())?;
        tracing::info!(app_id = %self.spec.app_id, id = %id, "Created document");
        Ok(ToolOutcome::success(json!({
            "id": id,
            "document": Value::Object(doc),
        })))
    }

    /// Resolve `args.id` to a document of the caller's workspace
    fn owned_document(
        &self,
        ctx: &ToolContext,
        args: &Fields,
    ) -> Result<std::result::Result<crate::store::Document, ToolOutcome>> {
        let Some(id) = args.get("id").and_then(|v| v.as_str()).filter(|s| !s.is_empty()) else {
            return Ok(Err(ToolOutcome::failure("Missing document id")));
        };
        let Some(doc) = ctx.store.get(&self.spec.collection, id)? else {
            return Ok(Err(ToolOutcome::failure(format!(
                "{} '{}' not found",
                self.spec.app_id, id
            ))));
        };
        if doc.get_str("workspaceId") != Some(ctx.workspace_id.as_str()) {
            return Ok(Err(ToolOutcome::failure(
                "Document does not belong to this workspace",
            )));
        }
        Ok(Ok(doc))
    }

    fn read(&self, ctx: &ToolContext, args: Fields) -> Result<ToolOutcome> {
        Ok(match self.owned_document(ctx, &args)? {
            Ok(doc) => ToolOutcome::success(json!({ "document": doc.into_value() })),
            Err(failure) => failure,
        })
    }

    fn update(&self, ctx: &ToolContext, args: Fields) -> Result<ToolOutcome> {
        let doc = match self.owned_document(ctx, &args)? {
            Ok(doc) => doc,
            Err(failure) => return Ok(failure),
        };

        let mut updates: Fields = args
            .into_iter()
            .filter(|(k, _)| k != "id" && self.spec.updatable_fields.iter().any(|f| f == k))
            .collect();
        updates.insert("updatedAt".into(), Self::now());
        let updated_fields: Vec<String> = updates.keys().cloned().collect();

        ctx.store.update(&self.spec.collection, &doc.id, updates)?;
        Ok(ToolOutcome::success(json!({
            "id": doc.id,
            "updated_fields": updated_fields,
        })))
    }

    fn delete(&self, ctx: &ToolContext, args: Fields) -> Result<ToolOutcome> {
        let doc = match self.owned_document(ctx, &args)? {
            Ok(doc) => doc,
            Err(failure) => return Ok(failure),
        };
        ctx.store.delete(&self.spec.collection, &doc.id)?;
        Ok(ToolOutcome::success(json!({ "id": doc.id })))
    }

    fn list(&self, ctx: &ToolContext) -> Result<ToolOutcome> {
        let docs = ctx
            .store
            .list_where(&self.spec.collection, "workspaceId", &json!(ctx.workspace_id))?;
        let count = docs.len();
        let documents: Vec<Value> = docs.into_iter().map(|d| d.into_value()).collect();
        Ok(ToolOutcome::success(json!({
            "count": count,
            "documents": documents,
        })))
    }
}

#[async_trait]
impl ToolHandler for CrudHandler {
    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<ToolOutcome> {
        let args = fields_from(args);
        match self.action {
            ToolAction::Create => self.create(ctx, args),
            ToolAction::Read => self.read(ctx, args),
            ToolAction::Update => self.update(ctx, args),
            ToolAction::Delete => self.delete(ctx, args),
            ToolAction::List => self.list(ctx),
        }
    }
}
