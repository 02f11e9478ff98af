//! # Syncstore Core
//!
//! Stores and the media they persist to.
//!
//! ## Example
//!
//! ```rust,ignore
//! use syncstore::{store, with_default, BroadcastChannel, Origin};
//! use std::sync::Arc;
//!
//! let origin = Origin::new("https://app.example");
//! let tab = origin.open_tab();
//! let local = Arc::new(tab.local());
//!
//! let counter = store::<i64>()
//!     .key("counter")
//!     .validator(with_default(0))
//!     .broadcast(BroadcastChannel::new(local.clone()))
//!     .build(local);
//!
//! let _sub = counter.subscribe(|n| println!("counter = {n}"));
//! counter.update(|n| n + 1)?;
//! ```

pub mod broadcast;
pub mod builder;
pub mod config;
pub mod cookies;
pub mod emitter;
pub mod file;
pub mod global;
pub mod memory;
pub mod multi;
pub mod store;

pub use broadcast::{BroadcastChannel, BroadcastMessage, Revalidate, DEFAULT_BROADCAST_SLOT};
pub use builder::{states, store, StoreBuilder};
pub use config::{ConfigError, ReconnectConfig, SyncConfig};
pub use cookies::{
    parse_cookie_header, CookieArea, CookieJar, CookieOptions, MemoryCookieJar, SameSite,
};
pub use emitter::{ChannelEmitter, Emitter, Subscription};
pub use file::FileStorage;
pub use global::{GlobalState, GlobalStates};
pub use memory::{MemoryStorage, Origin, Tab, TabStorage};
pub use multi::{MultiStore, MultiStoreBuilder, StoreSnapshot};
pub use store::Store;
