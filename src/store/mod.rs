//! Document store collaborator
//!
//! A keyed-collection abstraction: get by id, create, field-level update,
//! delete and equality-filtered listing. Documents are flexible attribute
//! bags; the core converts them into typed entities at the boundary.
//!
//! No transactions span documents. Every write is a single-document
//! fetch-modify-write, so concurrent writers to one document race and the
//! last write wins.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use serde_json::{Map, Value};

/// String-keyed attribute bag stored per document
pub type Fields = Map<String, Value>;

/// A stored document: its id plus its fields
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    /// Fields plus the id, as one JSON object
    pub fn into_value(self) -> Value {
        let mut fields = self.fields;
        fields.insert("id".to_string(), Value::String(self.id));
        Value::Object(fields)
    }
}

/// Backing store for apps, agents and sessions
pub trait DocumentStore: Send + Sync {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Insert a document under a fresh id and return the id
    fn create(&self, collection: &str, fields: Fields) -> Result<String>;

    /// Insert or replace a document under a known id
    fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    /// Merge `fields` into an existing document. Missing documents are `NotFound`.
    fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// All documents of a collection whose `field` equals `value`, in insertion order
    fn list_where(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Document>>;
}

/// Generate a new document id
pub fn new_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Build a `Fields` bag from a JSON value, dropping anything that isn't an object
pub fn fields_from(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}
