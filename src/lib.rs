//! Chatlens - AI assistant backend for chat conversations
//!
//! Settings and per-chat caches persist in a key-value store, AI actions go
//! through an OpenAI-compatible completion endpoint, and a cleanup actor
//! keeps the cache within its retention and size budget.

pub mod actions;
pub mod actors;
pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod preferences;
pub mod service;
pub mod source;
pub mod storage;
pub mod utils;

pub use api::{Request, Response};
pub use crate::config::Settings;
pub use service::AssistantService;

use actors::{AssistantActorHandle, CleanupActorHandle};
use anyhow::Result;
use cache::CleanupReport;
use crate::core::llm::LLMClient;
use std::sync::Arc;
use storage::KeyValueStore;

/// A running assistant: the request actor plus the cleanup scheduler.
/// Everything it started stops with [`Assistant::shutdown`].
pub struct Assistant {
    service: AssistantService,
    actor: AssistantActorHandle,
    cleanup: CleanupActorHandle,
}

impl Assistant {
    /// Open the configured store and start both actors
    pub async fn start(settings: &Settings) -> Result<Self> {
        let store = storage::open_store(&settings.storage).await?;
        let client = LLMClient::from_config(&settings.llm);
        Ok(Self::with_parts(store, client, Settings::api_key(), settings))
    }

    /// Start over an existing store and client
    pub fn with_parts(
        store: Arc<dyn KeyValueStore>,
        client: LLMClient,
        fallback_api_key: Option<String>,
        settings: &Settings,
    ) -> Self {
        let service = AssistantService::new(store, client, fallback_api_key);
        let actor = AssistantActorHandle::new(service.clone(), settings.system.channel_buffer_size);
        let cleanup = CleanupActorHandle::new(service.maintenance.clone(), settings.cleanup.clone());

        tracing::info!("Chatlens assistant started");
        Self {
            service,
            actor,
            cleanup,
        }
    }

    pub async fn request(&self, request: Request) -> Result<Response> {
        self.actor.request(request).await
    }

    /// Sweep the cache now instead of waiting for the schedule
    pub async fn run_cleanup(&self) -> Result<CleanupReport> {
        self.cleanup.run_now().await
    }

    pub fn service(&self) -> &AssistantService {
        &self.service
    }

    pub async fn shutdown(self) -> Result<()> {
        self.actor.shutdown().await?;
        self.cleanup.shutdown().await?;
        tracing::info!("Chatlens assistant shutdown complete");
        Ok(())
    }
}
