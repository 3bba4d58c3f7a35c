//! Cache Statistics & Eviction
//!
//! Information Hiding:
//! - Size accounting (JSON byte length per record) hidden from callers
//! - Retention and size-cap eviction order internalized
//! - Storage errors abort the sweep; scheduling and retry live in the cleanup actor

use super::{CacheStatistics, ChatCacheRecord, ChatCacheStore};
use crate::storage::{get_json, keys, set_json, KeyValueStore};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// What one cleanup sweep did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Auto-cleanup was disabled, nothing was touched
    pub skipped: bool,
    pub stories_removed: usize,
    /// Empty records past the retention window
    pub records_expired: usize,
    /// Records removed to get back under the size budget
    pub records_evicted: usize,
    pub total_size_after: u64,
}

#[derive(Clone)]
pub struct CacheMaintenance {
    chats: ChatCacheStore,
}

impl CacheMaintenance {
    pub fn new(chats: ChatCacheStore) -> Self {
        Self { chats }
    }

    /// Recompute totals from the stored records, keeping hit/miss counters
    pub async fn recalculate_cache_stats(&self, now: i64) -> Result<CacheStatistics> {
        recalculate_at(self.chats.backend(), now).await
    }

    /// One retention + size budget sweep at time `now` (ms since epoch)
    pub async fn perform_cache_cleanup(&self, now: i64) -> Result<CleanupReport> {
        let settings = self.chats.settings().get_settings().await?;
        if !settings.cache.auto_cleanup_enabled {
            tracing::debug!("[CacheMaintenance] Auto-cleanup disabled, skipping sweep");
            return Ok(CleanupReport {
                skipped: true,
                ..CleanupReport::default()
            });
        }

        let store = self.chats.backend();
        let retention_ms = settings.retention_ms();
        let mut report = CleanupReport::default();
        let mut survivors = Vec::new();

        for mut record in list_records(store).await? {
            // Active stories are never aged out
            let before = record.stories.len();
            record
                .stories
                .retain(|s| s.is_active || now - s.updated_at <= retention_ms);
            let removed = before - record.stories.len();

            if record.stories.is_empty() && now - record.last_analyzed > retention_ms {
                store
                    .remove(&keys::chat_cache(&record.chat_id))
                    .await
                    .with_context(|| format!("Failed to expire chat {}", record.chat_id))?;
                report.stories_removed += removed;
                report.records_expired += 1;
                continue;
            }

            if removed > 0 {
                set_json(store, &keys::chat_cache(&record.chat_id), &record)
                    .await
                    .with_context(|| format!("Failed to prune chat {}", record.chat_id))?;
                report.stories_removed += removed;
            }
            survivors.push(record);
        }

        let mut stats = recalculate_at(store, now).await?;
        let max_bytes = settings.max_cache_bytes();

        if stats.total_size > max_bytes {
            tracing::info!(
                "[CacheMaintenance] Cache size {} exceeds budget {}, evicting oldest chats",
                stats.total_size,
                max_bytes
            );
            survivors.sort_by_key(|r| r.last_analyzed);
            for record in &survivors {
                if stats.total_size <= max_bytes {
                    break;
                }
                store
                    .remove(&keys::chat_cache(&record.chat_id))
                    .await
                    .with_context(|| format!("Failed to evict chat {}", record.chat_id))?;
                stats.total_size = stats.total_size.saturating_sub(record.serialized_size());
                report.records_evicted += 1;
            }
            stats = recalculate_at(store, now).await?;
        }

        stats.last_cleanup = now;
        store_stats(store, &stats).await?;
        report.total_size_after = stats.total_size;

        tracing::info!(
            "[CacheMaintenance] Cleanup done: {} stories removed, {} chats expired, {} chats evicted",
            report.stories_removed,
            report.records_expired,
            report.records_evicted
        );
        Ok(report)
    }
}

/// All cached chat records; unreadable records are skipped with a warning
pub(crate) async fn list_records(store: &dyn KeyValueStore) -> Result<Vec<ChatCacheRecord>> {
    let chat_keys = store
        .keys_with_prefix(keys::CHAT_CACHE_PREFIX)
        .await
        .context("Failed to enumerate chat caches")?;

    let mut records = Vec::with_capacity(chat_keys.len());
    for key in chat_keys {
        match get_json::<ChatCacheRecord>(store, &key).await {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(e) if is_decode_error(&e) => {
                tracing::warn!("[CacheMaintenance] Skipping unreadable record '{}': {}", key, e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(records)
}

fn is_decode_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.is::<serde_json::Error>())
}

pub(crate) async fn load_stats(store: &dyn KeyValueStore, now: i64) -> Result<CacheStatistics> {
    let stats = get_json(store, keys::CACHE_STATS)
        .await
        .context("Failed to load cache stats")?;
    Ok(stats.unwrap_or_else(|| CacheStatistics::empty(now)))
}

pub(crate) async fn store_stats(store: &dyn KeyValueStore, stats: &CacheStatistics) -> Result<()> {
    set_json(store, keys::CACHE_STATS, stats)
        .await
        .context("Failed to store cache stats")
}

pub(crate) async fn recalculate_at(store: &dyn KeyValueStore, now: i64) -> Result<CacheStatistics> {
    let records = list_records(store).await?;
    let previous = load_stats(store, now).await?;

    let stats = CacheStatistics {
        total_size: records.iter().map(ChatCacheRecord::serialized_size).sum(),
        chat_count: records.len() as u64,
        story_count: records.iter().map(|r| r.stories.len() as u64).sum(),
        hits: previous.hits,
        misses: previous.misses,
        last_cleanup: now,
    };

    store_stats(store, &stats).await?;
    Ok(stats)
}
