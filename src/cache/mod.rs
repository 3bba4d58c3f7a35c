//! Per-conversation cache
//!
//! Information Hiding:
//! - Record layout and storage keys hidden behind `ChatCacheStore`
//! - Size accounting and eviction policy hidden behind `CacheMaintenance`

mod chat_store;
mod maintenance;

pub use chat_store::ChatCacheStore;
pub use maintenance::{CacheMaintenance, CleanupReport};

use crate::preferences::ResponseTone;
use serde::{Deserialize, Serialize};

/// Cached AI-derived state for one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCacheRecord {
    pub chat_id: String,
    #[serde(default)]
    pub chat_name: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub stories: Vec<StoryThread>,
    pub last_analyzed: i64,
    /// Fingerprints of messages already covered by the stored summary
    #[serde(default)]
    pub message_hashes: Vec<String>,
}

impl ChatCacheRecord {
    pub fn new(chat_id: impl Into<String>, now: i64) -> Self {
        Self {
            chat_id: chat_id.into(),
            chat_name: String::new(),
            is_group: false,
            stories: Vec::new(),
            last_analyzed: now,
            message_hashes: Vec::new(),
        }
    }

    /// Byte length of the record's JSON form, the unit of the size budget
    pub fn serialized_size(&self) -> u64 {
        serde_json::to_vec(self).map(|v| v.len() as u64).unwrap_or(0)
    }

    /// Upsert by id, then keep at most `cap` stories: active first, newest
    /// `updated_at` first within each group.
    pub fn upsert_story(&mut self, story: StoryThread, cap: usize) {
        match self.stories.iter_mut().find(|s| s.id == story.id) {
            Some(existing) => *existing = story,
            None => self.stories.push(story),
        }

        if self.stories.len() > cap {
            self.stories.sort_by(|a, b| {
                b.is_active
                    .cmp(&a.is_active)
                    .then_with(|| b.updated_at.cmp(&a.updated_at))
            });
            self.stories.truncate(cap);
        }
    }
}

/// AI-generated summary of one topical sub-conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryThread {
    pub id: String,
    pub chat_id: String,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub message_count: u32,
    pub created_at: i64,
    pub updated_at: i64,
    pub is_active: bool,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
    pub total_size: u64,
    pub chat_count: u64,
    pub story_count: u64,
    pub hits: u64,
    pub misses: u64,
    pub last_cleanup: i64,
}

impl CacheStatistics {
    pub fn empty(now: i64) -> Self {
        Self {
            total_size: 0,
            chat_count: 0,
            story_count: 0,
            hits: 0,
            misses: 0,
            last_cleanup: now,
        }
    }
}

/// Per-chat overrides of the global settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSettings {
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_tone: Option<ResponseTone>,
    #[serde(default = "default_auto_analyze")]
    pub auto_analyze: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_language: Option<String>,
}

fn default_auto_analyze() -> bool {
    true
}

impl ChatSettings {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            custom_prompt: None,
            preferred_tone: None,
            auto_analyze: true,
            translation_language: None,
            reply_language: None,
            analysis_language: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub chat_id: String,
    pub summary: String,
    #[serde(default)]
    pub key_topics: Vec<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub message_count: u32,
    pub last_updated: i64,
}

/// Everything known about one chat, assembled for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatContext {
    pub chat_id: String,
    pub chat_name: String,
    pub is_group: bool,
    pub settings: ChatSettings,
    pub summary: Option<ChatSummary>,
    pub stories: Vec<StoryThread>,
    pub last_accessed: i64,
}


#[cfg(test)]
mod tests {
    use super::test_support::story;
    use super::*;

    #[test]
    fn test_upsert_replaces_by_id() {
        let mut record = ChatCacheRecord::new("c", 0);
        record.upsert_story(story("s1", "c", 10, true), 10);

        let mut updated = story("s1", "c", 20, false);
        updated.title = "Renamed".to_string();
        record.upsert_story(updated, 10);

        assert_eq!(record.stories.len(), 1);
        assert_eq!(record.stories[0].title, "Renamed");
    }

    #[test]
    fn test_cap_orders_active_first_then_newest() {
        let mut record = ChatCacheRecord::new("c", 0);
        record.upsert_story(story("old-inactive", "c", 1, false), 3);
        record.upsert_story(story("new-inactive", "c", 50, false), 3);
        record.upsert_story(story("old-active", "c", 2, true), 3);
        record.upsert_story(story("new-active", "c", 40, true), 3);

        let ids: Vec<&str> = record.stories.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["new-active", "old-active", "new-inactive"]);
    }

    #[test]
    fn test_under_cap_keeps_insertion_order() {
        let mut record = ChatCacheRecord::new("c", 0);
        record.upsert_story(story("b", "c", 1, false), 5);
        record.upsert_story(story("a", "c", 2, true), 5);

        let ids: Vec<&str> = record.stories.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_chat_settings_defaults_from_partial_json() {
        let settings: ChatSettings = serde_json::from_str(r#"{"chatId": "x"}"#).unwrap();
        assert!(settings.auto_analyze);
        assert!(settings.reply_language.is_none());
    }
}
