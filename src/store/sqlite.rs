//! SQLite-backed document store
//!
//! One `documents` table; each document body is a JSON object.

use super::{new_document_id, Document, DocumentStore, Fields};
use crate::error::{EngineError, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| EngineError::Store(format!("Failed to create {}: {}", parent.display(), e)))?;
            }
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(collection, id)
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn read_body(conn: &Connection, collection: &str, id: &str) -> Result<Option<Fields>> {
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn write_body(conn: &Connection, collection: &str, id: &str, fields: &Fields) -> Result<()> {
        let body = serde_json::to_string(fields)?;
        conn.execute(
            r#"
            INSERT INTO documents (collection, id, body, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(collection, id) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
            params![collection, id, body, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

impl DocumentStore for SqliteStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        Ok(Self::read_body(&conn, collection, id)?.map(|fields| Document::new(id, fields)))
    }

    fn create(&self, collection: &str, fields: Fields) -> Result<String> {
        let id = new_document_id();
        let conn = self.conn.lock();
        Self::write_body(&conn, collection, &id, &fields)?;
        Ok(id)
    }

    fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let conn = self.conn.lock();
        Self::write_body(&conn, collection, id, &fields)
    }

    fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<()> {
        let conn = self.conn.lock();
        let mut existing = Self::read_body(&conn, collection, id)?
            .ok_or_else(|| EngineError::not_found(collection, id))?;
        for (key, value) in fields {
            existing.insert(key, value);
        }
        Self::write_body(&conn, collection, id, &existing)
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(())
    }

    fn list_where(&self, collection: &str, field: &str, value: &Value) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT id, body FROM documents WHERE collection = ?1 ORDER BY seq")?;
        let rows = stmt.query_map(params![collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, body) = row?;
            let fields: Fields = serde_json::from_str(&body)?;
            if fields.get(field) == Some(value) {
                docs.push(Document::new(id, fields));
            }
        }
        Ok(docs)
    }
}
