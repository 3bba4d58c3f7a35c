//! Key-Value Storage Abstraction
//!
//! Information Hiding:
//! - Storage backend implementation details hidden behind trait
//! - Allows swapping between memory, filesystem and SQLite without API changes
//! - Typed records (settings, chat caches, summaries) are layered on top as JSON values

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};

pub mod filesystem;
pub mod memory;
pub mod sqlite;

/// Persisted key layout
pub mod keys {
    pub const SETTINGS: &str = "settings";
    pub const CACHE_STATS: &str = "cache_stats";
    pub const CHAT_CACHE_PREFIX: &str = "chat:";
    pub const CHAT_SETTINGS_PREFIX: &str = "chat_settings:";
    pub const CHAT_SUMMARY_PREFIX: &str = "summary:";

    pub fn chat_cache(chat_id: &str) -> String {
        format!("{}{}", CHAT_CACHE_PREFIX, chat_id)
    }

    pub fn chat_settings(chat_id: &str) -> String {
        format!("{}{}", CHAT_SETTINGS_PREFIX, chat_id)
    }

    pub fn chat_summary(chat_id: &str) -> String {
        format!("{}{}", CHAT_SUMMARY_PREFIX, chat_id)
    }
}

/// Trait defining the local persisted state interface
/// Values are JSON documents; every key is owned by exactly one record type
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Load the value stored under `key`
    /// Returns `None` if the key doesn't exist
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// List all keys starting with `prefix`
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remove several keys at once
    async fn remove_many(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }

    /// Check if a key exists
    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Read and deserialize a typed record
pub async fn get_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(value) => {
            let record = serde_json::from_value(value)
                .with_context(|| format!("Failed to deserialize record '{}'", key))?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Serialize and write a typed record
pub async fn set_json<T: Serialize + Sync>(store: &dyn KeyValueStore, key: &str, record: &T) -> Result<()> {
    let value = serde_json::to_value(record)
        .with_context(|| format!("Failed to serialize record '{}'", key))?;
    store.set(key, value).await
}

/// Open the backend selected by configuration
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    let store: Arc<dyn KeyValueStore> = match config.backend {
        StorageBackend::Memory => Arc::new(memory::InMemoryStore::new()),
        StorageBackend::Filesystem => {
            Arc::new(filesystem::FileSystemStore::new(PathBuf::from(&config.path)).await?)
        }
        StorageBackend::Sqlite => {
            let path = PathBuf::from(&config.path);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .context("Failed to create database directory")?;
                }
            }
            Arc::new(sqlite::SqliteStore::open(&path)?)
        }
    };

    tracing::info!("[Storage] Opened {:?} backend at '{}'", config.backend, config.path);
    Ok(store)
}
