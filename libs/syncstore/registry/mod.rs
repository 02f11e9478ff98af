//! # Keyed Instance Registry
//!
//! Shares one native resource (event listener, observer, socket) among every
//! consumer that asks for it with an equal [`IdentityKey`], attaching it on
//! the first consumer and detaching it after the last.

pub mod event_listener;
pub mod identity;
pub mod instances;
pub mod observer;
pub mod socket;

pub use event_listener::{
    EventListenerRegistry, EventTarget, ListenerOptions, NativeHandler, NativeListenerId,
};
pub use identity::{canonicalize, IdentityKey, Identify, TargetId};
pub use instances::{Consumer, EventSink, Instance, InstanceRegistry};
pub use observer::{
    IntersectionOptions, MutationOptions, NativeObserver, ObserverBackend, ObserverCallback,
    ObserverRegistry, ResizeBox, ResizeOptions,
};
pub use socket::{
    SocketConnection, SocketConnector, SocketEvent, SocketEventHandler, SocketEventKind,
    SocketRegistry,
};
