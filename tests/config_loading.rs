//! Integration test: Configuration utilities
//!
//! Tests the bin_common configuration loading functionality.

use std::env;
use std::io::Write;
use synced_hooks::bin_common::{load_config_from_env, load_sync_config, ConfigType};
use synced_hooks::syncstore::DEFAULT_BROADCAST_SLOT;

#[test]
fn test_sync_config_default_path() {
    // Clear env var to test default
    env::remove_var("SYNCSTORE_CONFIG_PATH");

    let config_path = load_config_from_env(ConfigType::Sync);
    assert_eq!(config_path.to_str().unwrap(), "config/syncstore.yaml");
}

#[test]
fn test_custom_config() {
    let custom = ConfigType::Custom("custom/path.yaml".to_string());
    let config_path = load_config_from_env(custom);

    assert_eq!(config_path.to_str().unwrap(), "custom/path.yaml");
}

#[test]
fn test_config_type_default_paths() {
    assert_eq!(ConfigType::Sync.default_path(), "config/syncstore.yaml");

    let custom = ConfigType::Custom("test.yaml".to_string());
    assert_eq!(custom.default_path(), "test.yaml");
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let config = load_sync_config(ConfigType::Custom(
        "definitely/not/here/syncstore.yaml".to_string(),
    ))
    .unwrap();

    assert_eq!(config.storage_file, None);
    assert!(config.reconnect.is_none());
    assert!(!config.broadcast_slot.is_empty());
}

#[test]
fn test_load_from_custom_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "cookies:\n  path: /app\n  secure: true\nreconnect:\n  initial_delay_ms: 50\n  max_delay_ms: 400"
    )
    .unwrap();

    let path = file.path().to_str().unwrap().to_string();
    let config = load_sync_config(ConfigType::Custom(path)).unwrap();

    assert_eq!(config.cookies.path.as_deref(), Some("/app"));
    assert!(config.cookies.secure);
    assert_eq!(config.reconnect.unwrap().max_delay_ms, 400);
}

#[test]
fn test_invalid_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "reconnect:\n  initial_delay_ms: 0").unwrap();

    let path = file.path().to_str().unwrap().to_string();
    assert!(load_sync_config(ConfigType::Custom(path)).is_err());
}

#[test]
fn test_default_slot_is_exported() {
    assert_eq!(DEFAULT_BROADCAST_SLOT, "__syncstore_broadcast__");
}
