//! User preferences record
//!
//! A single versioned `UserSettings` document persisted under the
//! `settings` key. Reads merge the stored document onto the defaults so
//! fields added in later versions always have a value.

mod migration;
mod store;

pub use migration::{deep_merge, migrate_legacy_settings};
pub use store::SettingsStore;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Current layout version of the settings record
pub const SETTINGS_VERSION: u32 = 2;

pub const MIN_MESSAGE_LIMIT: u32 = 5;
pub const MAX_MESSAGE_LIMIT: u32 = 50;

/// Largest cache budget in megabytes (1 TB)
pub const MAX_CACHE_SIZE_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub version: u32,
    pub ai: AiSettings,
    pub general: GeneralSettings,
    pub cache: CacheSettings,
    pub privacy: PrivacySettings,
    pub theme: Theme,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSettings {
    pub api_key: String,
    pub model: String,
    pub default_tone: ResponseTone,
    pub enabled_features: FeatureFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseTone {
    Neutral,
    Friendly,
    Professional,
    Casual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    pub analyze: bool,
    pub translate: bool,
    pub explain_context: bool,
    pub detect_tone: bool,
    pub generate_reply: bool,
    pub generate_summary: bool,
    pub smart_suggestions: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSettings {
    pub reply_language: String,
    pub analysis_language: String,
    pub translation_language: String,
    /// Number of recent messages sent along with a summary request
    pub message_limit: u32,
    pub enable_hover_button: bool,
    pub keyboard_shortcuts: KeyboardShortcuts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyboardShortcuts {
    pub analyze: String,
    pub translate: String,
    pub generate_reply: String,
    pub open_chat: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSettings {
    pub retention_days: u32,
    /// Size budget in megabytes
    pub max_cache_size: u64,
    pub max_stories_per_chat: usize,
    pub auto_cleanup_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacySettings {
    pub data_collection_enabled: bool,
    pub excluded_chats: Vec<String>,
    pub auto_delete_processed_data: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    Auto,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            ai: AiSettings {
                api_key: String::new(),
                model: "gpt-4o-mini".to_string(),
                default_tone: ResponseTone::Neutral,
                enabled_features: FeatureFlags {
                    analyze: true,
                    translate: true,
                    explain_context: true,
                    detect_tone: true,
                    generate_reply: true,
                    generate_summary: true,
                    smart_suggestions: true,
                },
            },
            general: GeneralSettings {
                reply_language: "en".to_string(),
                analysis_language: "en".to_string(),
                translation_language: "en".to_string(),
                message_limit: 20,
                enable_hover_button: true,
                keyboard_shortcuts: KeyboardShortcuts {
                    analyze: "Alt+A".to_string(),
                    translate: "Alt+T".to_string(),
                    generate_reply: "Alt+R".to_string(),
                    open_chat: "Alt+S".to_string(),
                },
            },
            cache: CacheSettings {
                retention_days: 7,
                max_cache_size: 50,
                max_stories_per_chat: 10,
                auto_cleanup_enabled: true,
            },
            privacy: PrivacySettings {
                data_collection_enabled: false,
                excluded_chats: Vec::new(),
                auto_delete_processed_data: false,
            },
            theme: Theme::Auto,
        }
    }
}

impl UserSettings {
    /// Reject values the cache engine and actions cannot work with
    pub fn validate(&self) -> Result<()> {
        let limit = self.general.message_limit;
        if !(MIN_MESSAGE_LIMIT..=MAX_MESSAGE_LIMIT).contains(&limit) {
            bail!(
                "messageLimit must be between {} and {}, got {}",
                MIN_MESSAGE_LIMIT,
                MAX_MESSAGE_LIMIT,
                limit
            );
        }
        if self.cache.retention_days == 0 {
            bail!("retentionDays must be at least 1");
        }
        if self.cache.max_cache_size == 0 {
            bail!("maxCacheSize must be at least 1 MB");
        }
        if self.cache.max_cache_size > MAX_CACHE_SIZE_MB {
            bail!(
                "maxCacheSize must be at most {} MB, got {}",
                MAX_CACHE_SIZE_MB,
                self.cache.max_cache_size
            );
        }
        if self.cache.max_stories_per_chat == 0 {
            bail!("maxStoriesPerChat must be at least 1");
        }
        Ok(())
    }

    pub fn retention_ms(&self) -> i64 {
        i64::from(self.cache.retention_days) * 24 * 60 * 60 * 1000
    }

    pub fn max_cache_bytes(&self) -> u64 {
        self.cache.max_cache_size.saturating_mul(1024 * 1024)
    }

    pub fn is_chat_excluded(&self, chat_id: &str) -> bool {
        self.privacy.excluded_chats.iter().any(|c| c == chat_id)
    }
}

impl FeatureFlags {
    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Analyze => self.analyze,
            Feature::Translate => self.translate,
            Feature::ExplainContext => self.explain_context,
            Feature::DetectTone => self.detect_tone,
            Feature::GenerateReply => self.generate_reply,
            Feature::GenerateSummary => self.generate_summary,
        }
    }
}

/// AI features that can be switched off individually
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Analyze,
    Translate,
    ExplainContext,
    DetectTone,
    GenerateReply,
    GenerateSummary,
}

impl Feature {
    pub fn name(&self) -> &'static str {
        match self {
            Feature::Analyze => "analyze",
            Feature::Translate => "translate",
            Feature::ExplainContext => "explainContext",
            Feature::DetectTone => "detectTone",
            Feature::GenerateReply => "generateReply",
            Feature::GenerateSummary => "generateSummary",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = UserSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.retention_ms(), 7 * 86_400_000);
        assert_eq!(settings.max_cache_bytes(), 50 * 1_048_576);
    }

    #[test]
    fn test_message_limit_bounds() {
        let mut settings = UserSettings::default();
        settings.general.message_limit = 4;
        assert!(settings.validate().is_err());

        settings.general.message_limit = 50;
        assert!(settings.validate().is_ok());

        settings.general.message_limit = 51;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_cache_size_upper_bound() {
        let mut settings = UserSettings::default();
        settings.cache.max_cache_size = MAX_CACHE_SIZE_MB;
        assert!(settings.validate().is_ok());

        settings.cache.max_cache_size = 17_592_186_044_416;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("maxCacheSize"));
    }

    #[test]
    fn test_cache_bytes_saturate() {
        // Stored documents are not re-validated on read
        let mut settings = UserSettings::default();
        settings.cache.max_cache_size = 17_592_186_044_416;
        assert_eq!(settings.max_cache_bytes(), u64::MAX);

        settings.cache.max_cache_size = u64::MAX;
        assert_eq!(settings.max_cache_bytes(), u64::MAX);
    }

    #[test]
    fn test_wire_names_are_camel_case() {
        let value = serde_json::to_value(UserSettings::default()).unwrap();
        assert_eq!(value["cache"]["maxStoriesPerChat"], 10);
        assert_eq!(value["ai"]["enabledFeatures"]["explainContext"], true);
        assert_eq!(value["ai"]["defaultTone"], "neutral");
        assert_eq!(value["theme"], "auto");
    }
}
