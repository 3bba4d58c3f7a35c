use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

/// Process-level configuration (where to store data, which endpoint to call).
/// User preferences live in [`crate::preferences::UserSettings`] inside the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub llm: LLMConfig,
    pub storage: StorageConfig,
    pub cleanup: CleanupConfig,
    pub system: SystemConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub endpoint: String,
    pub models_endpoint: String,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Filesystem,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    pub interval_secs: u64,
    pub run_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub channel_buffer_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Self::with_defaults(Config::builder())?
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("llm.endpoint", "https://api.openai.com/v1/chat/completions")?
            .set_default("llm.models_endpoint", "https://api.openai.com/v1/models")?
            .set_default("llm.max_retries", 2)?
            .set_default("llm.retry_base_delay_ms", 1000)?
            .set_default("storage.backend", "filesystem")?
            .set_default("storage.path", "./chatlens-data")?
            .set_default("cleanup.interval_secs", 3600)?
            .set_default("cleanup.run_on_start", false)?
            .set_default("system.channel_buffer_size", 64)?
            .set_default("logging.level", "info")
    }

    /// Credential fallback used when the stored user settings hold no key
    pub fn api_key() -> Option<String> {
        env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())
    }

    /// In-memory configuration for tests and embedding
    pub fn in_memory() -> Self {
        Self {
            llm: LLMConfig {
                endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
                models_endpoint: "https://api.openai.com/v1/models".to_string(),
                max_retries: 2,
                retry_base_delay_ms: 1000,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                path: String::new(),
            },
            cleanup: CleanupConfig {
                interval_secs: 3600,
                run_on_start: false,
            },
            system: SystemConfig {
                channel_buffer_size: 64,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_deserialize() {
        let config = Settings::with_defaults(Config::builder())
            .unwrap()
            .build()
            .unwrap();
        let settings: Settings = config.try_deserialize().unwrap();

        assert_eq!(settings.llm.max_retries, 2);
        assert_eq!(settings.llm.retry_base_delay_ms, 1000);
        assert_eq!(settings.storage.backend, StorageBackend::Filesystem);
        assert_eq!(settings.cleanup.interval_secs, 3600);
    }

    #[test]
    fn test_override_backend() {
        let config = Settings::with_defaults(Config::builder())
            .unwrap()
            .set_override("storage.backend", "sqlite")
            .unwrap()
            .build()
            .unwrap();
        let settings: Settings = config.try_deserialize().unwrap();

        assert_eq!(settings.storage.backend, StorageBackend::Sqlite);
    }
}
