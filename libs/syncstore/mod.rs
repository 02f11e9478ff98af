//! # Syncstore
//!
//! Keyed, validated stores that stay in sync across every consumer in a
//! process and across tabs sharing an origin, plus a registry that shares one
//! native resource among every consumer asking for it.
//!
//! ## Features
//!
//! - **Validated reads**: every `get` passes through a validator; plain
//!   functions and schema objects are both accepted
//! - **Type-state builder**: a store without key or validator does not compile
//! - **Cross-tab invalidation**: writes bump a broadcast slot, other tabs
//!   re-read their own storage instead of trusting the message
//! - **Keyed instance registry**: one native listener, observer or socket per
//!   identity key, attached on the first consumer and detached after the last
//! - **Pluggable media**: in-memory, per-origin tabs, JSON file, cookie jar

pub mod traits;
pub mod core;
pub mod registry;

// Re-export all traits
pub use traits::*;

// Re-export core store functionality
pub use self::core::{
    broadcast, builder, config, cookies, emitter, file, global, memory, multi,
    builder::{states, store, StoreBuilder},
    broadcast::{BroadcastChannel, Revalidate, DEFAULT_BROADCAST_SLOT},
    config::{ConfigError, ReconnectConfig, SyncConfig},
    cookies::{parse_cookie_header, CookieArea, CookieJar, CookieOptions, MemoryCookieJar, SameSite},
    emitter::{ChannelEmitter, Emitter, Subscription},
    file::FileStorage,
    global::{GlobalState, GlobalStates},
    memory::{MemoryStorage, Origin, Tab, TabStorage},
    multi::{MultiStore, MultiStoreBuilder, StoreSnapshot},
    store::Store,
};

// Re-export registry
pub use registry::{
    Consumer, EventListenerRegistry, EventSink, EventTarget, IdentityKey, Identify, Instance,
    InstanceRegistry, ListenerOptions, ObserverBackend, ObserverRegistry, SocketConnection,
    SocketConnector, SocketEvent, SocketEventKind, SocketRegistry, TargetId,
};
