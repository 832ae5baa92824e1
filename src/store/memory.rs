//! In-process document store

use super::{new_document_id, Document, DocumentStore, Fields};
use crate::error::{EngineError, Result};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// Document store backed by in-memory maps
///
/// Collections keep insertion order so listings are stable.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, IndexMap<String, Fields>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    fn create(&self, collection: &str, fields: Fields) -> Result<String> {
        let id = new_document_id();
        self.set(collection, &id, fields)?;
        Ok(id)
    }

    fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        Ok(())
    }

    fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let mut collections = self.collections.write();
        let existing = collections
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| EngineError::not_found(collection, id))?;
        for (key, value) in fields {
            existing.insert(key, value);
        }
        Ok(())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        if let Some(c) = self.collections.write().get_mut(collection) {
            c.shift_remove(id);
        }
        Ok(())
    }

    fn list_where(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Document>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| {
                c.iter()
                    .filter(|(_, fields)| fields.get(field) == Some(value))
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
