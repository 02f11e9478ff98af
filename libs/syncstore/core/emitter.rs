//! In-process publish/subscribe
//!
//! [`Emitter<T>`] delivers values to listeners in registration order.
//!
//! # Re-entrancy
//!
//! `emit` takes a snapshot of the listener list before calling anything, and
//! no lock is held while listeners run. Consequences:
//!
//! - a listener subscribed during an `emit` is not called by that `emit`
//! - a listener unsubscribed during an `emit` is skipped if it has not been
//!   called yet (each slot carries an alive flag checked right before the call)
//! - listeners may freely call `subscribe`, `unsubscribe` and `emit`
//!
//! Listeners are infallible. A panicking listener unwinds through `emit` and
//! the remaining listeners of that pass are not called.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slot<T> {
    id: u64,
    listener: Listener<T>,
    alive: Arc<AtomicBool>,
}

struct EmitterInner<T> {
    next_id: AtomicU64,
    slots: Mutex<Vec<Slot<T>>>,
}

/// Multi-listener publish/subscribe primitive
///
/// Cloning an `Emitter` yields another handle to the same listener list.
pub struct Emitter<T> {
    inner: Arc<EmitterInner<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listener_count", &self.inner.slots.lock().len())
            .finish()
    }
}

impl<T: 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Emitter<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                next_id: AtomicU64::new(0),
                slots: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a listener
    ///
    /// The returned [`Subscription`] removes it again; see its docs for the
    /// drop behaviour.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let alive = Arc::new(AtomicBool::new(true));
        self.inner.slots.lock().push(Slot {
            id,
            listener: Arc::new(listener),
            alive: Arc::clone(&alive),
        });

        let weak: Weak<EmitterInner<T>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            alive.store(false, Ordering::Release);
            if let Some(inner) = weak.upgrade() {
                inner.slots.lock().retain(|slot| slot.id != id);
            }
        })
    }

    /// Deliver `value` to every listener registered when the call started
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<(Listener<T>, Arc<AtomicBool>)> = self
            .inner
            .slots
            .lock()
            .iter()
            .map(|slot| (Arc::clone(&slot.listener), Arc::clone(&slot.alive)))
            .collect();

        for (listener, alive) in snapshot {
            if alive.load(Ordering::Acquire) {
                listener(value);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.slots.lock().len()
    }

    /// Drop every listener; outstanding subscriptions become no-ops
    pub fn clear(&self) {
        let slots = std::mem::take(&mut *self.inner.slots.lock());
        for slot in slots {
            slot.alive.store(false, Ordering::Release);
        }
    }
}

/// One emitter per channel key
///
/// Used by stores that manage several named entries behind one object.
pub struct ChannelEmitter<K, T> {
    channels: Arc<Mutex<HashMap<K, Emitter<T>>>>,
}

impl<K, T> Clone for ChannelEmitter<K, T> {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
        }
    }
}

impl<K, T> std::fmt::Debug for ChannelEmitter<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEmitter")
            .field("channel_count", &self.channels.lock().len())
            .finish()
    }
}

impl<K, T> Default for ChannelEmitter<K, T>
where
    K: Hash + Eq + Clone + Send + 'static,
    T: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> ChannelEmitter<K, T>
where
    K: Hash + Eq + Clone + Send + 'static,
    T: 'static,
{
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn subscribe(
        &self,
        channel: K,
        listener: impl Fn(&T) + Send + Sync + 'static,
    ) -> Subscription {
        let (emitter, inner) = {
            let mut channels = self.channels.lock();
            let emitter = channels
                .entry(channel.clone())
                .or_insert_with(Emitter::new)
                .clone();
            let inner = emitter.subscribe(listener);
            (emitter, inner)
        };

        // drop the channel once its last listener leaves
        let channels = Arc::downgrade(&self.channels);
        Subscription::new(move || {
            inner.unsubscribe();
            if let Some(channels) = channels.upgrade() {
                let mut channels = channels.lock();
                let vacant = channels.get(&channel).is_some_and(|current| {
                    Arc::ptr_eq(&current.inner, &emitter.inner) && current.listener_count() == 0
                });
                if vacant {
                    channels.remove(&channel);
                }
            }
        })
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn emit(&self, channel: &K, value: &T) {
        let emitter = self.channels.lock().get(channel).cloned();
        if let Some(emitter) = emitter {
            emitter.emit(value);
        }
    }

    pub fn listener_count(&self, channel: &K) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map_or(0, Emitter::listener_count)
    }

    pub fn clear(&self) {
        let channels = std::mem::take(&mut *self.channels.lock());
        for emitter in channels.values() {
            emitter.clear();
        }
    }
}

type Teardown = Box<dyn FnOnce() + Send>;

/// Handle returned by every `subscribe`-style call
///
/// `unsubscribe` may be called any number of times; only the first call has an
/// effect. Dropping the handle unsubscribes as well, unless [`detach`](Self::detach)
/// was called to keep the listener for the lifetime of its source.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    teardown: Mutex<Option<Teardown>>,
}

impl Subscription {
    /// Build a subscription from its teardown action
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Mutex::new(Some(Box::new(teardown))),
        }
    }

    /// A subscription with nothing to tear down
    pub fn empty() -> Self {
        Self {
            teardown: Mutex::new(None),
        }
    }

    /// Combine several subscriptions into one
    pub fn all(subscriptions: Vec<Subscription>) -> Self {
        Self::new(move || {
            for subscription in subscriptions {
                subscription.unsubscribe();
            }
        })
    }

    pub fn unsubscribe(&self) {
        let teardown = self.teardown.lock().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    pub fn is_active(&self) -> bool {
        self.teardown.lock().is_some()
    }

    /// Keep the listener registered after this handle is dropped
    pub fn detach(self) {
        self.teardown.lock().take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
