//! File System Key-Value Storage
//!
//! Information Hiding:
//! - File paths and JSON serialization format hidden from users
//! - Key-to-filename encoding hidden behind interface
//! - Persistence mechanism independent of storage trait users

use super::KeyValueStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tokio::fs;

/// File system storage - each key is a JSON file
/// Files are stored as {base_path}/{encoded key}.json
pub struct FileSystemStore {
    base_path: PathBuf,
}

impl FileSystemStore {
    pub async fn new(base_path: PathBuf) -> Result<Self> {
        // Create base directory if it doesn't exist
        fs::create_dir_all(&base_path)
            .await
            .context("Failed to create storage directory")?;

        Ok(Self { base_path })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", encode_key(key)))
    }
}

/// Percent-encode everything outside `[A-Za-z0-9._-]` so chat ids such as
/// `12345@c.us` or `chat:x` map to portable file names.
fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

fn decode_key(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

#[async_trait]
impl KeyValueStore for FileSystemStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.key_path(key);

        if !path.exists() {
            tracing::trace!("[FileSystemStore] Key '{}' does not exist", key);
            return Ok(None);
        }

        let json = fs::read_to_string(&path)
            .await
            .context(format!("Failed to read storage file: {:?}", path))?;

        let value = serde_json::from_str(&json)
            .context(format!("Failed to parse storage file: {:?}", path))?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let path = self.key_path(key);
        let json = serde_json::to_string_pretty(&value).context("Failed to serialize value")?;

        // Write to a sibling file first so a crash never leaves half a record behind
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .await
            .context(format!("Failed to write storage file: {:?}", tmp_path))?;
        fs::rename(&tmp_path, &path)
            .await
            .context(format!("Failed to move storage file into place: {:?}", path))?;

        tracing::trace!("[FileSystemStore] Stored '{}' at {:?}", key, path);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_path(key);

        if path.exists() {
            fs::remove_file(&path)
                .await
                .context(format!("Failed to delete storage file: {:?}", path))?;
            tracing::trace!("[FileSystemStore] Removed '{}' at {:?}", key, path);
        }

        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.base_path)
            .await
            .context("Failed to read storage directory")?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_key)
            else {
                continue;
            };
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }

        keys.sort();
        tracing::trace!("[FileSystemStore] Listed {} keys with prefix '{}'", keys.len(), prefix);
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_key_encoding() {
        assert_eq!(encode_key("chat:12345@c.us"), "chat%3A12345%40c.us");
        assert_eq!(decode_key("chat%3A12345%40c.us").unwrap(), "chat:12345@c.us");
        assert!(decode_key("bad%4").is_none());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSystemStore::new(temp_dir.path().to_path_buf()).await.unwrap();

        store.set("chat:12345@c.us", json!({"chatId": "12345@c.us"})).await.unwrap();
        let loaded = store.get("chat:12345@c.us").await.unwrap().unwrap();

        assert_eq!(loaded["chatId"], "12345@c.us");
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSystemStore::new(temp_dir.path().to_path_buf()).await.unwrap();

        assert!(store.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSystemStore::new(temp_dir.path().to_path_buf()).await.unwrap();

        store.set("settings", json!({})).await.unwrap();
        assert!(store.contains("settings").await.unwrap());

        store.remove("settings").await.unwrap();
        assert!(!store.contains("settings").await.unwrap());

        // Removing again is a no-op
        store.remove("settings").await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_with_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSystemStore::new(temp_dir.path().to_path_buf()).await.unwrap();

        store.set("chat:a@c.us", json!(1)).await.unwrap();
        store.set("chat:b@g.us", json!(2)).await.unwrap();
        store.set("chat_settings:a@c.us", json!(3)).await.unwrap();

        let keys = store.keys_with_prefix("chat:").await.unwrap();
        assert_eq!(keys, vec!["chat:a@c.us".to_string(), "chat:b@g.us".to_string()]);
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().to_path_buf();

        {
            let store = FileSystemStore::new(path.clone()).await.unwrap();
            store.set("settings", json!({"version": 2})).await.unwrap();
        }

        {
            let store = FileSystemStore::new(path).await.unwrap();
            let loaded = store.get("settings").await.unwrap().unwrap();
            assert_eq!(loaded["version"], 2);
        }
    }
}
