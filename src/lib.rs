//! Synced Hooks - Main Library
//!
//! Re-exports the `syncstore` workspace member and hosts the helpers shared
//! by the binaries.
//!
//! ## Architecture
//!
//! - **syncstore**: stores, storage areas, broadcast and the instance registry
//! - **bin_common**: config path resolution, logging setup, binary runner
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use synced_hooks::bin_common::{init_logging, load_config_from_env, ConfigType};
//! use synced_hooks::syncstore::SyncConfig;
//! ```

// Re-export workspace libraries for convenience
pub use syncstore;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod logging;
    pub mod runner;

    pub use cli::{load_config_from_env, load_sync_config, ConfigType};
    pub use logging::{init_logging, init_logging_with_level};
    pub use runner::{BinaryRunner, RunConfig};
}
