//! Application configuration.
//!
//! Aggregates storage and messaging configuration into a single Config
//! struct that can be loaded from YAML files or environment variables.

mod messaging;
mod storage;

pub use messaging::{ChannelConfig, KafkaConfig, MessagingConfig, MessagingType};
pub use storage::{MongodbConfig, StorageConfig, StorageType};

/// Error raised while loading configuration.
pub use ::config::ConfigError;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "EVENTSTAGE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "EVENTSTAGE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "EVENTSTAGE_LOG";

use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Producer id stamped on every event this process creates.
    pub producer: String,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Messaging configuration (optional). Without it shipped events are not broadcast.
    pub messaging: Option<MessagingConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            producer: "eventstage".to_string(),
            storage: StorageConfig::default(),
            messaging: None,
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig {
                storage_type: StorageType::Memory,
                ..StorageConfig::default()
            },
            messaging: Some(MessagingConfig {
                messaging_type: MessagingType::Channel,
                ..MessagingConfig::default()
            }),
            ..Self::default()
        }
    }
}
