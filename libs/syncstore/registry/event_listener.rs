//! Shared DOM-style event listeners
//!
//! However many consumers listen for `kind` on one target with the same
//! [`ListenerOptions`], exactly one native listener is installed.

use crate::error::Result;
use crate::registry::identity::{IdentityKey, Identify};
use crate::registry::instances::{Consumer, EventSink, InstanceRegistry};
use crate::traits::NativeResource;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Flags that change how the native listener behaves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ListenerOptions {
    pub capture: bool,
    pub passive: bool,
    pub once: bool,
}

impl ListenerOptions {
    pub fn capture() -> Self {
        Self {
            capture: true,
            ..Self::default()
        }
    }

    pub fn passive() -> Self {
        Self {
            passive: true,
            ..Self::default()
        }
    }
}

/// Handler installed on the native target
pub type NativeHandler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Id the native side hands back for later removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeListenerId(pub u64);

/// Something that dispatches named events (a window, a document, an element)
pub trait EventTarget: Identify + Send + Sync + 'static {
    type Event: Send + Sync + 'static;

    fn add_event_listener(
        &self,
        kind: &str,
        options: ListenerOptions,
        handler: NativeHandler<Self::Event>,
    ) -> Result<NativeListenerId>;

    fn remove_event_listener(&self, kind: &str, options: ListenerOptions, id: NativeListenerId);
}

/// One native listener for (target, kind, options)
pub struct ListenerResource<T: EventTarget> {
    target: Arc<T>,
    kind: String,
    options: ListenerOptions,
    native: Mutex<Option<NativeListenerId>>,
}

impl<T: EventTarget> NativeResource for ListenerResource<T> {
    type Event = T::Event;

    fn attach(&self, sink: EventSink<T::Event>) -> Result<()> {
        let handler: NativeHandler<T::Event> = Arc::new(move |event: &T::Event| sink.emit(event));
        let id = self
            .target
            .add_event_listener(&self.kind, self.options, handler)?;
        *self.native.lock() = Some(id);
        Ok(())
    }

    fn detach(&self) {
        if let Some(id) = self.native.lock().take() {
            self.target
                .remove_event_listener(&self.kind, self.options, id);
        }
    }
}

/// Registry of shared event listeners for one target type
pub struct EventListenerRegistry<T: EventTarget> {
    instances: InstanceRegistry<ListenerResource<T>>,
}

impl<T: EventTarget> Clone for EventListenerRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            instances: self.instances.clone(),
        }
    }
}

impl<T: EventTarget> std::fmt::Debug for EventListenerRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListenerRegistry")
            .field("instances", &self.instances)
            .finish()
    }
}

impl<T: EventTarget> Default for EventListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: EventTarget> EventListenerRegistry<T> {
    pub fn new() -> Self {
        Self {
            instances: InstanceRegistry::new("event-listener"),
        }
    }

    /// Identity of the listener for (target, kind, options)
    pub fn key(target: &T, kind: &str, options: ListenerOptions) -> Result<IdentityKey> {
        IdentityKey::for_target(target.target_id(), kind, &options)
    }

    /// Listen for `kind` events on `target`
    pub fn listen(
        &self,
        target: &Arc<T>,
        kind: &str,
        options: ListenerOptions,
        callback: impl Fn(&T::Event) + Send + Sync + 'static,
    ) -> Result<Consumer> {
        let key = Self::key(target, kind, options)?;
        let target = Arc::clone(target);
        let kind_owned = kind.to_string();
        self.instances.subscribe(
            key,
            move || {
                Ok(ListenerResource {
                    target,
                    kind: kind_owned,
                    options,
                    native: Mutex::new(None),
                })
            },
            callback,
        )
    }

    pub fn instances(&self) -> &InstanceRegistry<ListenerResource<T>> {
        &self.instances
    }

    pub fn reset(&self) {
        self.instances.reset();
    }
}
