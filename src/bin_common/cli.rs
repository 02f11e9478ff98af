//! CLI utilities for binaries
//!
//! Handles configuration loading and environment variables
//! for all binary executables.

use std::path::PathBuf;
use syncstore::{ConfigError, SyncConfig};
use tracing::warn;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Store configuration (config/syncstore.yaml)
    Sync,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Sync => "config/syncstore.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Get the environment variable name for this config type
    pub fn env_var_name(&self) -> &str {
        match self {
            ConfigType::Sync => "SYNCSTORE_CONFIG_PATH",
            ConfigType::Custom(_) => "CONFIG_PATH",
        }
    }
}

/// Load configuration path from environment or use default
///
/// # Examples
/// ```
/// use synced_hooks::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Custom("demo.yaml".into()));
/// assert_eq!(path.to_str(), Some("demo.yaml"));
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    if let ConfigType::Custom(path) = &config_type {
        return PathBuf::from(path);
    }
    std::env::var(config_type.env_var_name())
        .unwrap_or_else(|_| config_type.default_path().to_string())
        .into()
}

/// Load the store configuration for `config_type`
///
/// A missing file falls back to defaults (still subject to environment
/// overrides); any other failure is returned.
pub fn load_sync_config(config_type: ConfigType) -> Result<SyncConfig, ConfigError> {
    let path = load_config_from_env(config_type);
    if !path.exists() {
        warn!("Config file {:?} not found, using defaults", path);
        dotenv::dotenv().ok();
        let mut config = SyncConfig::default();
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        return Ok(config);
    }
    SyncConfig::load(path)
}
