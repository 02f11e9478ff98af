use crate::core::broadcast::{BroadcastChannel, DEFAULT_BROADCAST_SLOT};
use crate::core::cookies::{CookieArea, CookieJar, CookieOptions};
use crate::core::file::FileStorage;
use crate::registry::socket::{SocketConnector, SocketRegistry};
use crate::traits::{ExponentialBackoff, StorageArea, StorageEventSource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Environment variable overriding `broadcast_slot`
pub const BROADCAST_SLOT_ENV: &str = "SYNCSTORE_BROADCAST_SLOT";

/// Environment variable overriding `log_level`
pub const LOG_LEVEL_ENV: &str = "SYNCSTORE_LOG_LEVEL";

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Reconnect policy for shared sockets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// None = unlimited
    #[serde(default)]
    pub max_attempts: Option<usize>,
}

impl ReconnectConfig {
    pub fn strategy(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.max_attempts,
        )
    }
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Storage key used for cross-tab signals
    pub broadcast_slot: String,
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
    /// Attributes written with every cookie
    pub cookies: CookieOptions,
    /// JSON file for durable storage, if any
    pub storage_file: Option<PathBuf>,
    /// Socket reconnect policy; absent means sockets never reconnect
    pub reconnect: Option<ReconnectConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            broadcast_slot: DEFAULT_BROADCAST_SLOT.to_string(),
            log_level: "info".to_string(),
            cookies: CookieOptions::default(),
            storage_file: None,
            reconnect: None,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a YAML file
    ///
    /// Reads `.env` first, then applies environment overrides and validates.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml(&yaml_content)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without touching the environment
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply `SYNCSTORE_*` overrides looked up through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(slot) = lookup(BROADCAST_SLOT_ENV) {
            info!("Overriding broadcast slot from environment variable");
            self.broadcast_slot = slot;
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV) {
            info!("Overriding log level from environment variable");
            self.log_level = level;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast_slot.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "broadcast_slot must not be empty".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if let Some(reconnect) = &self.reconnect {
            if reconnect.initial_delay_ms == 0 {
                return Err(ConfigError::ValidationError(
                    "reconnect.initial_delay_ms must be greater than 0".to_string(),
                ));
            }
            if reconnect.max_delay_ms < reconnect.initial_delay_ms {
                return Err(ConfigError::ValidationError(
                    "reconnect.max_delay_ms must not be below initial_delay_ms".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Broadcast channel on the configured slot
    pub fn broadcast_channel<A>(&self, area: Arc<A>) -> BroadcastChannel
    where
        A: StorageArea + StorageEventSource + 'static,
    {
        BroadcastChannel::with_slot(area, self.broadcast_slot.clone())
    }

    /// Cookie area writing the configured attributes
    pub fn cookie_area<J: CookieJar>(&self, jar: Arc<J>) -> CookieArea<J> {
        CookieArea::new(jar, self.cookies.clone())
    }

    /// Open the configured storage file, if one is configured
    pub fn file_storage(&self) -> crate::error::Result<Option<FileStorage>> {
        self.storage_file
            .as_ref()
            .map(FileStorage::open)
            .transpose()
    }

    /// Socket registry reconnecting with the configured policy
    ///
    /// Without a `reconnect` section sockets stay closed once they drop.
    pub fn socket_registry<C: SocketConnector>(&self, connector: C) -> SocketRegistry<C> {
        let registry = SocketRegistry::new(connector);
        match self.reconnect.clone() {
            Some(reconnect) => registry.with_reconnect(move || reconnect.strategy()),
            None => registry,
        }
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Broadcast slot: {}", self.broadcast_slot);
        info!("  Log level: {}", self.log_level);
        info!("  Cookie path: {:?}", self.cookies.path);
        info!("  Storage file: {:?}", self.storage_file);
        info!("  Reconnect: {:?}", self.reconnect);
    }
}
