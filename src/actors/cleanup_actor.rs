use crate::actors::messages::CleanupMessage;
use crate::cache::{CacheMaintenance, CleanupReport};
use crate::config::CleanupConfig;
use crate::utils::time::now_millis;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// Periodic cache sweeps on a fixed interval
pub struct CleanupActorHandle {
    sender: Sender<CleanupMessage>,
    task: JoinHandle<()>,
}

impl CleanupActorHandle {
    pub fn new(maintenance: CacheMaintenance, config: CleanupConfig) -> Self {
        let (sender, receiver) = channel(4);
        let task = tokio::spawn(cleanup_actor(receiver, maintenance, config));
        Self { sender, task }
    }

    /// Sweep immediately and return the report
    pub async fn run_now(&self) -> anyhow::Result<CleanupReport> {
        let (response_tx, response_rx) = oneshot::channel();
        self.sender
            .send(CleanupMessage::RunNow(response_tx))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send message to Cleanup actor: {}", e))?;

        response_rx
            .await
            .map_err(|_| anyhow::anyhow!("Cleanup actor dropped the request"))?
            .map_err(|e| anyhow::anyhow!(e))
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.sender.send(CleanupMessage::Shutdown).await;
        self.task
            .await
            .map_err(|e| anyhow::anyhow!("Cleanup actor panicked: {}", e))
    }
}

async fn cleanup_actor(
    mut receiver: Receiver<CleanupMessage>,
    maintenance: CacheMaintenance,
    config: CleanupConfig,
) {
    let period = Duration::from_secs(config.interval_secs.max(1));
    let first = if config.run_on_start {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut ticker = interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        "[CleanupActor] Started, sweeping every {}s",
        period.as_secs()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // A failed sweep is retried on the next tick
                if let Err(e) = sweep(&maintenance).await {
                    tracing::error!("[CleanupActor] Scheduled cleanup failed: {:#}", e);
                }
            }
            message = receiver.recv() => match message {
                Some(CleanupMessage::RunNow(response)) => {
                    let result = sweep(&maintenance).await.map_err(|e| format!("{:#}", e));
                    let _ = response.send(result);
                }
                Some(CleanupMessage::Shutdown) => {
                    tracing::info!("[CleanupActor] Received shutdown signal");
                    break;
                }
                None => {
                    tracing::info!("[CleanupActor] Channel closed, shutting down");
                    break;
                }
            }
        }
    }
}

async fn sweep(maintenance: &CacheMaintenance) -> anyhow::Result<CleanupReport> {
    let report = maintenance.perform_cache_cleanup(now_millis()).await?;
    if !report.skipped {
        tracing::info!(
            "[CleanupActor] Removed {} stories, expired {} and evicted {} chats",
            report.stories_removed,
            report.records_expired,
            report.records_evicted
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStatistics, ChatCacheStore};
    use crate::preferences::SettingsStore;
    use crate::storage::memory::InMemoryStore;
    use crate::storage::{get_json, keys, KeyValueStore};
    use std::sync::Arc;

    fn maintenance() -> (CacheMaintenance, Arc<dyn KeyValueStore>) {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let chats = ChatCacheStore::new(store.clone(), SettingsStore::new(store.clone()));
        (CacheMaintenance::new(chats), store)
    }

    async fn stats(store: &Arc<dyn KeyValueStore>) -> Option<CacheStatistics> {
        get_json(store.as_ref(), keys::CACHE_STATS).await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_sweep_after_one_interval() {
        let (maintenance, store) = maintenance();
        let handle = CleanupActorHandle::new(
            maintenance,
            CleanupConfig {
                interval_secs: 60,
                run_on_start: false,
            },
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(stats(&store).await.is_none());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(stats(&store).await.is_some());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_on_start() {
        let (maintenance, store) = maintenance();
        let handle = CleanupActorHandle::new(
            maintenance,
            CleanupConfig {
                interval_secs: 3600,
                run_on_start: true,
            },
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(stats(&store).await.is_some());
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_now_returns_report() {
        let (maintenance, _store) = maintenance();
        let handle = CleanupActorHandle::new(
            maintenance,
            CleanupConfig {
                interval_secs: 3600,
                run_on_start: false,
            },
        );

        let report = handle.run_now().await.unwrap();
        assert!(!report.skipped);
        assert_eq!(report.records_evicted, 0);
        handle.shutdown().await.unwrap();
    }
}
