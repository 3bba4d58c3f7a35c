mod settings;

pub use settings::{
    CleanupConfig, LLMConfig, LoggingConfig, Settings, StorageBackend, StorageConfig,
    SystemConfig,
};
