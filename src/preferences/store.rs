//! Settings persistence
//!
//! Information Hiding:
//! - Storage key and raw JSON layout hidden from callers
//! - Legacy migration runs on load, before defaults are merged in

use super::{deep_merge, migrate_legacy_settings, UserSettings};
use crate::storage::{keys, set_json, KeyValueStore};
use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load settings, falling back to defaults when nothing usable is stored
    pub async fn get_settings(&self) -> Result<UserSettings> {
        let Some(mut stored) = self.store.get(keys::SETTINGS).await? else {
            tracing::debug!("[Settings] No settings found, using defaults");
            return Ok(UserSettings::default());
        };

        if migrate_legacy_settings(&mut stored) {
            // Persist the upgraded document
            self.store
                .set(keys::SETTINGS, stored.clone())
                .await
                .context("Failed to persist migrated settings")?;
        }

        let defaults = serde_json::to_value(UserSettings::default())?;
        let merged = deep_merge(&defaults, &stored);

        match serde_json::from_value::<UserSettings>(merged) {
            Ok(settings) => {
                tracing::debug!("[Settings] Settings loaded from storage");
                Ok(settings)
            }
            Err(e) => {
                tracing::warn!("[Settings] Stored settings unreadable ({}), using defaults", e);
                Ok(UserSettings::default())
            }
        }
    }

    /// Validate and overwrite the stored settings
    pub async fn save_settings(&self, settings: &UserSettings) -> Result<()> {
        settings.validate()?;
        set_json(self.store.as_ref(), keys::SETTINGS, settings)
            .await
            .context("Failed to save settings")?;
        tracing::info!("[Settings] Settings saved");
        Ok(())
    }

    /// Merge a partial JSON document onto the current settings and save
    pub async fn update_settings(&self, partial: &Value) -> Result<UserSettings> {
        let current = serde_json::to_value(self.get_settings().await?)?;
        let merged = deep_merge(&current, partial);
        let updated: UserSettings =
            serde_json::from_value(merged).context("Settings update has the wrong shape")?;
        self.save_settings(&updated).await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;
    use serde_json::json;

    fn store() -> (Arc<InMemoryStore>, SettingsStore) {
        let backend = Arc::new(InMemoryStore::new());
        (backend.clone(), SettingsStore::new(backend))
    }

    #[tokio::test]
    async fn test_defaults_when_empty() {
        let (_, settings) = store();
        let loaded = settings.get_settings().await.unwrap();
        assert_eq!(loaded, UserSettings::default());
    }

    #[tokio::test]
    async fn test_partial_record_merges_with_defaults() {
        let (backend, settings) = store();
        backend
            .set(keys::SETTINGS, json!({"version": 2, "cache": {"retentionDays": 3}}))
            .await
            .unwrap();

        let loaded = settings.get_settings().await.unwrap();
        assert_eq!(loaded.cache.retention_days, 3);
        assert_eq!(loaded.cache.max_stories_per_chat, 10);
        assert_eq!(loaded.ai.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_legacy_record_is_migrated_and_persisted() {
        let (backend, settings) = store();
        backend
            .set(keys::SETTINGS, json!({"general": {"outputLanguage": "de"}}))
            .await
            .unwrap();

        let loaded = settings.get_settings().await.unwrap();
        assert_eq!(loaded.general.reply_language, "de");
        assert_eq!(loaded.general.analysis_language, "de");
        assert_eq!(loaded.general.translation_language, "de");

        let raw = backend.get(keys::SETTINGS).await.unwrap().unwrap();
        assert!(raw["general"].get("outputLanguage").is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_falls_back_to_defaults() {
        let (backend, settings) = store();
        backend
            .set(keys::SETTINGS, json!({"cache": {"retentionDays": "forever"}}))
            .await
            .unwrap();

        let loaded = settings.get_settings().await.unwrap();
        assert_eq!(loaded.cache.retention_days, 7);
    }

    #[tokio::test]
    async fn test_save_rejects_invalid() {
        let (_, settings) = store();
        let mut invalid = UserSettings::default();
        invalid.cache.max_stories_per_chat = 0;

        assert!(settings.save_settings(&invalid).await.is_err());
    }

    #[tokio::test]
    async fn test_update_settings() {
        let (_, settings) = store();
        let updated = settings
            .update_settings(&json!({"ai": {"apiKey": "sk-test"}, "theme": "dark"}))
            .await
            .unwrap();

        assert_eq!(updated.ai.api_key, "sk-test");
        assert_eq!(updated.ai.model, "gpt-4o-mini");

        let reloaded = settings.get_settings().await.unwrap();
        assert_eq!(reloaded, updated);
    }
}
