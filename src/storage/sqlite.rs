//! SQLite Key-Value Storage
//!
//! Information Hiding:
//! - Table layout and SQL hidden from users
//! - Connection guarded by a Mutex; callers only see the async trait

use super::KeyValueStore;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed store with a single `kv` table.
/// The schema is created on `open()`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open sqlite database {:?}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (useful for tests)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory sqlite")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .context("Failed to create kv table")?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow!("sqlite connection lock poisoned: {}", e))
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to read key '{}'", key))?;

        match raw {
            Some(json) => {
                let value = serde_json::from_str(&json)
                    .with_context(|| format!("Corrupt JSON stored under '{}'", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let json = serde_json::to_string(&value).context("Failed to serialize value")?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, json],
        )
        .with_context(|| format!("Failed to write key '{}'", key))?;
        tracing::trace!("[SqliteStore] Stored '{}'", key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .with_context(|| format!("Failed to delete key '{}'", key))?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        // substr comparison avoids LIKE wildcard escaping for '_' and '%' in prefixes
        let mut stmt = conn
            .prepare("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
            .context("Failed to prepare key listing")?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))
            .context("Failed to list keys")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read key row")?;
        Ok(keys)
    }

    async fn remove_many(&self, keys: &[String]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        for key in keys {
            tx.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .with_context(|| format!("Failed to delete key '{}'", key))?;
        }
        tx.commit().context("Failed to commit deletions")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("settings", json!({"version": 1})).await.unwrap();
        store.set("settings", json!({"version": 2})).await.unwrap();

        let loaded = store.get("settings").await.unwrap().unwrap();
        assert_eq!(loaded["version"], 2);
    }

    #[tokio::test]
    async fn test_prefix_with_underscore_is_literal() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("chat:a", json!(1)).await.unwrap();
        store.set("chat_settings:a", json!(2)).await.unwrap();
        store.set("chatXsettings:a", json!(3)).await.unwrap();

        let keys = store.keys_with_prefix("chat_settings:").await.unwrap();
        assert_eq!(keys, vec!["chat_settings:a".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_many_and_missing() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("chat:a", json!(1)).await.unwrap();
        store.set("chat:b", json!(2)).await.unwrap();

        store
            .remove_many(&["chat:a".to_string(), "chat:b".to_string()])
            .await
            .unwrap();
        assert!(store.get("chat:a").await.unwrap().is_none());
        store.remove("chat:a").await.unwrap();
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("chatlens.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.set("chat:x", json!({"chatId": "x"})).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let loaded = store.get("chat:x").await.unwrap().unwrap();
        assert_eq!(loaded["chatId"], "x");
    }
}
