//! Append-only SQLite log of conversation turns

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::record::ContextRecord;

/// Append-log storage backend.
///
/// Rows are immutable once written. Retrieval is ordered by `created_at`,
/// with the autoincrement `seq` column breaking ties so that sequential
/// appends always come back in insertion order.
pub struct AppendLogStorage {
    conn: Arc<Mutex<Connection>>,
}

impl AppendLogStorage {
    /// Create a new append-log storage
    pub fn new(config: &Config) -> Result<Self> {
        let conn = Connection::open(config.sqlite_path())?;
        conn.execute_batch(include_str!("append_schema.sql"))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a new turn with a store-assigned timestamp
    pub fn insert(
        &self,
        user_id: &str,
        prompt: &str,
        response: &str,
        embedding: Option<&[f32]>,
    ) -> Result<ContextRecord> {
        let conn = self.conn.lock().map_err(|e| Error::storage(e.to_string()))?;

        let record = ContextRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            prompt: prompt.to_string(),
            response: response.to_string(),
            embedding: embedding.map(|e| e.to_vec()),
            created_at: Utc::now(),
        };

        conn.execute(
            r#"
            INSERT INTO user_contexts (id, user_id, prompt, response, embedding, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.id.to_string(),
                record.user_id,
                record.prompt,
                record.response,
                record
                    .embedding
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                record.created_at.to_rfc3339(),
            ],
        )?;

        Ok(record)
    }

    /// List all turns for a user, oldest first
    pub fn list_by_user(&self, user_id: &str) -> Result<Vec<ContextRecord>> {
        let conn = self.conn.lock().map_err(|e| Error::storage(e.to_string()))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, user_id, prompt, response, embedding, created_at
            FROM user_contexts WHERE user_id = ?1
            ORDER BY created_at, seq
            "#,
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ContextRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                prompt: row.get(2)?,
                response: row.get(3)?,
                embedding: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }

        Ok(records)
    }

}

/// Intermediate struct for reading from SQLite
struct ContextRow {
    id: String,
    user_id: String,
    prompt: String,
    response: String,
    embedding: Option<String>,
    created_at: String,
}

impl ContextRow {
    fn into_record(self) -> Result<ContextRecord> {
        Ok(ContextRecord {
            id: Uuid::parse_str(&self.id).map_err(|e| Error::storage(e.to_string()))?,
            user_id: self.user_id,
            prompt: self.prompt,
            response: self.response,
            embedding: self
                .embedding
                .map(|e| serde_json::from_str(&e))
                .transpose()?,
            created_at: chrono::DateTime::parse_from_rfc3339(&self.created_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|e| Error::storage(e.to_string()))?,
        })
    }
}
