//! Chat Cache Store
//!
//! Information Hiding:
//! - Storage keys for records, per-chat settings and summaries hidden
//! - Story cap enforcement internalized in `save_story`
//! - Every record mutation refreshes the aggregate statistics

use super::maintenance::{list_records, load_stats, recalculate_at, store_stats};
use super::{
    CacheStatistics, ChatCacheRecord, ChatContext, ChatSettings, ChatSummary, StoryThread,
};
use crate::preferences::SettingsStore;
use crate::storage::{get_json, keys, set_json, KeyValueStore};
use crate::utils::time::now_millis;
use anyhow::{Context, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct ChatCacheStore {
    store: Arc<dyn KeyValueStore>,
    settings: SettingsStore,
}

impl ChatCacheStore {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: SettingsStore) -> Self {
        Self { store, settings }
    }

    pub(crate) fn backend(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub(crate) fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Cached record for a chat, `None` when nothing is cached yet
    pub async fn get_record(&self, chat_id: &str) -> Result<Option<ChatCacheRecord>> {
        get_json(self.backend(), &keys::chat_cache(chat_id))
            .await
            .with_context(|| format!("Failed to load cache for chat {}", chat_id))
    }

    /// Overwrite the record for its chat and refresh statistics
    pub async fn save_record(&self, record: &ChatCacheRecord) -> Result<()> {
        set_json(self.backend(), &keys::chat_cache(&record.chat_id), record)
            .await
            .with_context(|| format!("Failed to save cache for chat {}", record.chat_id))?;
        recalculate_at(self.backend(), now_millis()).await?;
        tracing::debug!(
            "[ChatCacheStore] Saved chat '{}' with {} stories",
            record.chat_id,
            record.stories.len()
        );
        Ok(())
    }

    /// Insert or replace a story, keeping the chat within `maxStoriesPerChat`
    pub async fn save_story(&self, chat_id: &str, story: StoryThread) -> Result<()> {
        let settings = self.settings.get_settings().await?;
        let mut record = match self.get_record(chat_id).await? {
            Some(record) => record,
            None => ChatCacheRecord::new(chat_id, now_millis()),
        };

        let cap = settings.cache.max_stories_per_chat;
        if record.stories.len() >= cap {
            tracing::debug!("[ChatCacheStore] Chat '{}' is at the story cap of {}", chat_id, cap);
        }
        record.upsert_story(story, cap);

        self.save_record(&record).await
    }

    /// Stories of a chat (empty when uncached); counts a cache hit or miss
    pub async fn get_stories(&self, chat_id: &str) -> Result<Vec<StoryThread>> {
        match self.get_record(chat_id).await? {
            Some(record) => {
                self.record_cache_hit().await?;
                Ok(record.stories)
            }
            None => {
                self.record_cache_miss().await?;
                Ok(Vec::new())
            }
        }
    }

    /// Remove one story; returns whether anything was removed
    pub async fn delete_story(&self, chat_id: &str, story_id: &str) -> Result<bool> {
        let Some(mut record) = self.get_record(chat_id).await? else {
            return Ok(false);
        };

        let before = record.stories.len();
        record.stories.retain(|s| s.id != story_id);
        if record.stories.len() == before {
            return Ok(false);
        }

        self.save_record(&record).await?;
        Ok(true)
    }

    /// Delete the cached record of one chat
    pub async fn clear_record(&self, chat_id: &str) -> Result<()> {
        self.store
            .remove(&keys::chat_cache(chat_id))
            .await
            .with_context(|| format!("Failed to clear cache for chat {}", chat_id))?;
        recalculate_at(self.backend(), now_millis()).await?;
        tracing::info!("[ChatCacheStore] Cleared cache for chat '{}'", chat_id);
        Ok(())
    }

    /// Delete every cached record and zero the totals
    pub async fn clear_all(&self) -> Result<()> {
        let chat_keys = self.store.keys_with_prefix(keys::CHAT_CACHE_PREFIX).await?;
        if !chat_keys.is_empty() {
            self.store
                .remove_many(&chat_keys)
                .await
                .context("Failed to clear all cache")?;
        }

        let now = now_millis();
        let mut stats = load_stats(self.backend(), now).await?;
        stats.total_size = 0;
        stats.chat_count = 0;
        stats.story_count = 0;
        stats.last_cleanup = now;
        store_stats(self.backend(), &stats).await?;

        tracing::info!("[ChatCacheStore] Cleared {} cached chats", chat_keys.len());
        Ok(())
    }

    pub async fn all_records(&self) -> Result<Vec<ChatCacheRecord>> {
        list_records(self.backend()).await
    }

    pub async fn get_cache_stats(&self) -> Result<CacheStatistics> {
        load_stats(self.backend(), now_millis()).await
    }

    pub async fn record_cache_hit(&self) -> Result<()> {
        let mut stats = self.get_cache_stats().await?;
        stats.hits += 1;
        store_stats(self.backend(), &stats).await
    }

    pub async fn record_cache_miss(&self) -> Result<()> {
        let mut stats = self.get_cache_stats().await?;
        stats.misses += 1;
        store_stats(self.backend(), &stats).await
    }

    /// Per-chat settings, or the defaults when none were saved
    pub async fn get_chat_settings(&self, chat_id: &str) -> Result<ChatSettings> {
        let stored = get_json(self.backend(), &keys::chat_settings(chat_id))
            .await
            .with_context(|| format!("Failed to load settings for chat {}", chat_id))?;
        Ok(stored.unwrap_or_else(|| ChatSettings::new(chat_id)))
    }

    pub async fn save_chat_settings(&self, settings: &ChatSettings) -> Result<()> {
        set_json(self.backend(), &keys::chat_settings(&settings.chat_id), settings)
            .await
            .with_context(|| format!("Failed to save settings for chat {}", settings.chat_id))
    }

    pub async fn get_chat_summary(&self, chat_id: &str) -> Result<Option<ChatSummary>> {
        get_json(self.backend(), &keys::chat_summary(chat_id))
            .await
            .with_context(|| format!("Failed to load summary for chat {}", chat_id))
    }

    pub async fn save_chat_summary(&self, summary: &ChatSummary) -> Result<()> {
        set_json(self.backend(), &keys::chat_summary(&summary.chat_id), summary)
            .await
            .with_context(|| format!("Failed to save summary for chat {}", summary.chat_id))
    }

    /// Settings, summary and stories of one chat in a single view.
    /// Name and group flag come from the cached record when there is one.
    pub async fn get_chat_context(
        &self,
        chat_id: &str,
        chat_name: &str,
        is_group: bool,
    ) -> Result<ChatContext> {
        let (settings, summary, record) = futures::try_join!(
            self.get_chat_settings(chat_id),
            self.get_chat_summary(chat_id),
            self.get_record(chat_id),
        )?;

        let (name, group, stories) = match record {
            Some(record) => {
                let name = if record.chat_name.is_empty() {
                    chat_name.to_string()
                } else {
                    record.chat_name
                };
                (name, record.is_group, record.stories)
            }
            None => (chat_name.to_string(), is_group, Vec::new()),
        };

        Ok(ChatContext {
            chat_id: chat_id.to_string(),
            chat_name: name,
            is_group: group,
            settings,
            summary,
            stories,
            last_accessed: now_millis(),
        })
    }

    /// Remove the record, per-chat settings and summary of one chat
    pub async fn clear_chat_data(&self, chat_id: &str) -> Result<()> {
        let chat_keys = vec![
            keys::chat_cache(chat_id),
            keys::chat_settings(chat_id),
            keys::chat_summary(chat_id),
        ];
        self.store
            .remove_many(&chat_keys)
            .await
            .with_context(|| format!("Failed to clear data for chat {}", chat_id))?;
        recalculate_at(self.backend(), now_millis()).await?;
        tracing::info!("[ChatCacheStore] Cleared all data for chat '{}'", chat_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::story;
    use crate::preferences::UserSettings;
    use crate::storage::memory::InMemoryStore;

    async fn chat_store(max_stories: usize) -> ChatCacheStore {
        let backend: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let settings = SettingsStore::new(backend.clone());
        let mut user = UserSettings::default();
        user.cache.max_stories_per_chat = max_stories;
        settings.save_settings(&user).await.unwrap();
        ChatCacheStore::new(backend, settings)
    }

    #[tokio::test]
    async fn test_missing_record_is_none() {
        let chats = chat_store(10).await;
        assert!(chats.get_record("nobody@c.us").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_story_creates_record_and_stats() {
        let chats = chat_store(10).await;
        chats.save_story("a@c.us", story("s1", "a@c.us", 100, true)).await.unwrap();

        let record = chats.get_record("a@c.us").await.unwrap().unwrap();
        assert_eq!(record.stories.len(), 1);

        let stats = chats.get_cache_stats().await.unwrap();
        assert_eq!(stats.chat_count, 1);
        assert_eq!(stats.story_count, 1);
        assert_eq!(stats.total_size, record.serialized_size());
    }

    #[tokio::test]
    async fn test_save_story_never_exceeds_cap() {
        let chats = chat_store(10).await;
        for i in 0..15 {
            let active = i % 3 == 0;
            chats
                .save_story("a@c.us", story(&format!("s{}", i), "a@c.us", i, active))
                .await
                .unwrap();
            let record = chats.get_record("a@c.us").await.unwrap().unwrap();
            assert!(record.stories.len() <= 10);
        }

        let stories = chats.get_record("a@c.us").await.unwrap().unwrap().stories;
        assert_eq!(stories.len(), 10);

        let first_inactive = stories.iter().position(|s| !s.is_active).unwrap();
        assert!(stories[first_inactive..].iter().all(|s| !s.is_active));
        let inactive: Vec<i64> = stories[first_inactive..].iter().map(|s| s.updated_at).collect();
        let mut sorted = inactive.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(inactive, sorted);
    }

    #[tokio::test]
    async fn test_cap_scenario_keeps_new_story() {
        let chats = chat_store(10).await;
        let chat_id = "12345@c.us";

        // 12 stories persisted before the cap was lowered: 10 active, 2 old inactive
        let mut record = ChatCacheRecord::new(chat_id, 0);
        for i in 0..10 {
            record.stories.push(story(&format!("active-{}", i), chat_id, 1_000 + i, true));
        }
        record.stories.push(story("inactive-0", chat_id, 10, false));
        record.stories.push(story("inactive-1", chat_id, 20, false));
        chats.save_record(&record).await.unwrap();

        chats.save_story(chat_id, story("fresh", chat_id, 5_000, true)).await.unwrap();

        let stories = chats.get_record(chat_id).await.unwrap().unwrap().stories;
        assert_eq!(stories.len(), 10);
        assert!(stories.iter().any(|s| s.id == "fresh"));
        assert!(stories.iter().all(|s| s.is_active));
        assert!(!stories.iter().any(|s| s.id == "active-0"));
    }

    #[tokio::test]
    async fn test_delete_story_is_noop_when_absent() {
        let chats = chat_store(10).await;
        assert!(!chats.delete_story("none@c.us", "s1").await.unwrap());

        chats.save_story("a@c.us", story("s1", "a@c.us", 1, true)).await.unwrap();
        assert!(!chats.delete_story("a@c.us", "missing").await.unwrap());
        assert!(chats.delete_story("a@c.us", "s1").await.unwrap());
        assert!(chats.get_record("a@c.us").await.unwrap().unwrap().stories.is_empty());
    }

    #[tokio::test]
    async fn test_clear_all_resets_totals_but_keeps_counters() {
        let chats = chat_store(10).await;
        chats.save_story("a@c.us", story("s1", "a@c.us", 1, true)).await.unwrap();
        chats.save_story("b@c.us", story("s2", "b@c.us", 1, true)).await.unwrap();
        chats.get_stories("a@c.us").await.unwrap();
        chats.get_stories("zzz@c.us").await.unwrap();

        chats.clear_all().await.unwrap();

        assert!(chats.all_records().await.unwrap().is_empty());
        let stats = chats.get_cache_stats().await.unwrap();
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.chat_count, 0);
        assert_eq!(stats.story_count, 0);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_clear_all_keeps_chat_settings() {
        let chats = chat_store(10).await;
        let mut settings = ChatSettings::new("a@c.us");
        settings.reply_language = Some("fr".to_string());
        chats.save_chat_settings(&settings).await.unwrap();
        chats.save_story("a@c.us", story("s1", "a@c.us", 1, true)).await.unwrap();

        chats.clear_all().await.unwrap();

        let loaded = chats.get_chat_settings("a@c.us").await.unwrap();
        assert_eq!(loaded.reply_language.as_deref(), Some("fr"));
    }

    #[tokio::test]
    async fn test_chat_context_and_clear_chat_data() {
        let chats = chat_store(10).await;
        let mut record = ChatCacheRecord::new("g@g.us", 5);
        record.chat_name = "Family".to_string();
        record.is_group = true;
        chats.save_record(&record).await.unwrap();
        chats
            .save_chat_summary(&ChatSummary {
                chat_id: "g@g.us".to_string(),
                summary: "Planning a trip".to_string(),
                key_topics: vec!["travel".to_string()],
                participants: vec![],
                message_count: 4,
                last_updated: 5,
            })
            .await
            .unwrap();

        let context = chats.get_chat_context("g@g.us", "fallback", false).await.unwrap();
        assert_eq!(context.chat_name, "Family");
        assert!(context.is_group);
        assert_eq!(context.summary.unwrap().summary, "Planning a trip");
        assert!(context.settings.auto_analyze);

        chats.clear_chat_data("g@g.us").await.unwrap();
        let context = chats.get_chat_context("g@g.us", "fallback", false).await.unwrap();
        assert_eq!(context.chat_name, "fallback");
        assert!(context.summary.is_none());
        assert_eq!(chats.get_cache_stats().await.unwrap().chat_count, 0);
    }
}
