//! Single-slot SQLite storage: one context blob per user

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::Config;
use crate::error::{Error, Result};

/// Single-slot storage backend.
///
/// Each user has exactly one stored JSON blob, replaced wholesale on every
/// write. Use this for "latest summarized state" semantics rather than full
/// history.
pub struct SingleSlotStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SingleSlotStorage {
    /// Create a new single-slot storage
    pub fn new(config: &Config) -> Result<Self> {
        let conn = Connection::open(config.sqlite_path())?;
        conn.execute_batch(include_str!("single_slot_schema.sql"))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert or replace the context blob for a user
    pub fn upsert(
        &self,
        user_id: &str,
        context: &serde_json::Value,
        embedding: &[f32],
    ) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| Error::storage(e.to_string()))?;

        conn.execute(
            r#"
            INSERT INTO user_context_slots (user_id, context, embedding, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id) DO UPDATE SET
                context = excluded.context,
                embedding = excluded.embedding,
                updated_at = excluded.updated_at
            "#,
            params![
                user_id,
                serde_json::to_string(context)?,
                serde_json::to_string(embedding)?,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Get the context blob for a user, if any
    pub fn get(&self, user_id: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn.lock().map_err(|e| Error::storage(e.to_string()))?;

        let context: Option<String> = conn
            .query_row(
                "SELECT context FROM user_context_slots WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        context
            .map(|c| serde_json::from_str(&c).map_err(Error::from))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (SingleSlotStorage, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = Config::with_data_dir(dir.path());
        (SingleSlotStorage::new(&config).unwrap(), dir)
    }

    #[test]
    fn unknown_user_returns_none() {
        let (storage, _dir) = storage();
        assert!(storage.get("nobody").unwrap().is_none());
    }

    #[test]
    fn upsert_then_get() {
        let (storage, _dir) = storage();

        let context = serde_json::json!({"prompt": "hi", "response": "hello"});
        storage.upsert("u1", &context, &[0.0; 4]).unwrap();

        assert_eq!(storage.get("u1").unwrap(), Some(context));
    }

    #[test]
    fn second_upsert_replaces_wholesale() {
        let (storage, _dir) = storage();

        storage
            .upsert("u1", &serde_json::json!({"prompt": "hi"}), &[0.1; 4])
            .unwrap();
        let replacement = serde_json::json!({"prompt": "bye", "response": "goodbye"});
        storage.upsert("u1", &replacement, &[0.2; 4]).unwrap();

        assert_eq!(storage.get("u1").unwrap(), Some(replacement));
    }

    #[test]
    fn slots_are_per_user() {
        let (storage, _dir) = storage();

        storage
            .upsert("u1", &serde_json::json!({"a": 1}), &[0.0; 2])
            .unwrap();
        storage
            .upsert("u2", &serde_json::json!({"b": 2}), &[0.0; 2])
            .unwrap();

        assert_eq!(
            storage.get("u1").unwrap(),
            Some(serde_json::json!({"a": 1}))
        );
        assert_eq!(
            storage.get("u2").unwrap(),
            Some(serde_json::json!({"b": 2}))
        );
    }
}
