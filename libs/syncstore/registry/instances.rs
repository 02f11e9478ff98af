use crate::core::emitter::Subscription;
use crate::error::{Result, StoreError};
use crate::registry::identity::IdentityKey;
use crate::traits::NativeResource;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Consumers of one instance, in registration order
struct ConsumerList<E> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Callback<E>)>>,
}

impl<E> ConsumerList<E> {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: Mutex::new(Vec::new()),
        }
    }
}

/// Delivers events from a native resource to the consumers of its instance
///
/// Given to [`NativeResource::attach`]. Once the instance is gone, or has no
/// consumers left, `emit` does nothing, so late callbacks from the native side
/// are harmless.
pub struct EventSink<E> {
    consumers: Weak<ConsumerList<E>>,
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self {
            consumers: Weak::clone(&self.consumers),
        }
    }
}

impl<E> std::fmt::Debug for EventSink<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("live", &(self.consumers.strong_count() > 0))
            .finish()
    }
}

impl<E> EventSink<E> {
    /// Fan `event` out to a snapshot of the current consumers
    pub fn emit(&self, event: &E) {
        let Some(consumers) = self.consumers.upgrade() else {
            return;
        };
        let snapshot: Vec<Callback<E>> = consumers
            .entries
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in snapshot {
            callback(event);
        }
    }

    /// Number of consumers that would receive an event right now
    pub fn consumer_count(&self) -> usize {
        self.consumers
            .upgrade()
            .map_or(0, |consumers| consumers.entries.lock().len())
    }
}

struct RegistryInner<R: NativeResource> {
    name: String,
    instances: Mutex<HashMap<IdentityKey, Arc<Instance<R>>>>,
}

/// Deduplicates native resources by identity key
///
/// At most one [`Instance`] (and so one attached native resource) exists per
/// key. The resource is attached when its first consumer arrives and detached,
/// with the registry entry removed, when the last consumer is released.
///
/// Cloning yields another handle to the same registry.
pub struct InstanceRegistry<R: NativeResource> {
    inner: Arc<RegistryInner<R>>,
}

impl<R: NativeResource> Clone for InstanceRegistry<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: NativeResource> std::fmt::Debug for InstanceRegistry<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("name", &self.inner.name)
            .field("instances", &self.len())
            .finish()
    }
}

impl<R: NativeResource> InstanceRegistry<R> {
    /// Create an empty registry; `name` only appears in logs
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                name: name.into(),
                instances: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Return the instance for `key`, creating it with `factory` if absent
    ///
    /// The factory runs at most once per absent key; its error propagates
    /// unchanged and nothing is registered.
    pub fn instance(
        &self,
        key: IdentityKey,
        factory: impl FnOnce() -> Result<R>,
    ) -> Result<Arc<Instance<R>>> {
        let mut instances = self.inner.instances.lock();
        if let Some(existing) = instances.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let resource = factory()?;
        let instance = Arc::new(Instance {
            key: key.clone(),
            resource,
            consumers: Arc::new(ConsumerList::new()),
            attached: AtomicBool::new(false),
            registry: Arc::downgrade(&self.inner),
        });
        instances.insert(key, Arc::clone(&instance));
        debug!("[{}] created instance {}", self.inner.name, instance.key);
        Ok(instance)
    }

    /// Look up or create the instance for `key` and add `callback` to it
    pub fn subscribe(
        &self,
        key: IdentityKey,
        factory: impl FnOnce() -> Result<R>,
        callback: impl Fn(&R::Event) + Send + Sync + 'static,
    ) -> Result<Consumer> {
        self.instance(key, factory)?.add(callback)
    }

    /// Existing instance for `key`, without creating one
    pub fn get(&self, key: &IdentityKey) -> Option<Arc<Instance<R>>> {
        self.inner.instances.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.inner.instances.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detach every resource and forget every instance
    ///
    /// Outstanding [`Consumer`] handles become no-ops.
    pub fn reset(&self) {
        let instances = std::mem::take(&mut *self.inner.instances.lock());
        for instance in instances.into_values() {
            instance.consumers.entries.lock().clear();
            if instance.attached.swap(false, Ordering::AcqRel) {
                instance.resource.detach();
            }
        }
        debug!("[{}] reset", self.inner.name);
    }
}

/// One shared native resource plus its consumers
pub struct Instance<R: NativeResource> {
    key: IdentityKey,
    resource: R,
    consumers: Arc<ConsumerList<R::Event>>,
    attached: AtomicBool,
    registry: Weak<RegistryInner<R>>,
}

impl<R: NativeResource> std::fmt::Debug for Instance<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("key", &self.key)
            .field("consumers", &self.consumer_count())
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl<R: NativeResource> Instance<R> {
    pub fn key(&self) -> &IdentityKey {
        &self.key
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.entries.lock().len()
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Register a consumer callback
    ///
    /// Attaches the native resource if this is the first consumer. If this
    /// instance was already evicted from its registry, the callback goes to
    /// the live instance for the same key, or this instance registers itself
    /// again when there is none.
    pub fn add(
        self: &Arc<Self>,
        callback: impl Fn(&R::Event) + Send + Sync + 'static,
    ) -> Result<Consumer> {
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| StoreError::Resource(format!("registry for {} was dropped", self.key)))?;

        let mut instances = registry.instances.lock();
        let target = match instances.get(&self.key) {
            Some(live) => Arc::clone(live),
            None => {
                instances.insert(self.key.clone(), Arc::clone(self));
                Arc::clone(self)
            }
        };

        let id = target.consumers.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: Callback<R::Event> = Arc::new(callback);
        let first = {
            let mut entries = target.consumers.entries.lock();
            entries.push((id, callback));
            entries.len() == 1
        };

        if first && !target.attached.load(Ordering::Acquire) {
            let sink = EventSink {
                consumers: Arc::downgrade(&target.consumers),
            };
            if let Err(e) = target.resource.attach(sink) {
                target.consumers.entries.lock().retain(|(cid, _)| *cid != id);
                if target.consumer_count() == 0 {
                    instances.remove(&target.key);
                }
                warn!("[{}] attach failed for {}: {}", registry.name, target.key, e);
                return Err(e);
            }
            target.attached.store(true, Ordering::Release);
            debug!("[{}] attached {}", registry.name, target.key);
        }
        drop(instances);

        let weak = Arc::downgrade(&target);
        Ok(Consumer {
            id,
            subscription: Subscription::new(move || {
                if let Some(instance) = weak.upgrade() {
                    instance.release(id);
                }
            }),
        })
    }

    fn release(&self, id: u64) {
        let registry = self.registry.upgrade();
        let mut instances = registry.as_ref().map(|r| r.instances.lock());

        let now_empty = {
            let mut entries = self.consumers.entries.lock();
            let before = entries.len();
            entries.retain(|(cid, _)| *cid != id);
            before != entries.len() && entries.is_empty()
        };
        if !now_empty {
            return;
        }

        if self.attached.swap(false, Ordering::AcqRel) {
            self.resource.detach();
        }
        if let Some(instances) = instances.as_mut() {
            let is_current = instances
                .get(&self.key)
                .is_some_and(|live| std::ptr::eq(Arc::as_ptr(live), self));
            if is_current {
                instances.remove(&self.key);
            }
        }
        if let Some(registry) = registry.as_ref() {
            debug!("[{}] detached {}", registry.name, self.key);
        }
    }
}

/// Handle for one registered consumer
///
/// [`release`](Self::release) is idempotent. Dropping the handle releases it.
#[must_use = "dropping a Consumer releases it immediately"]
#[derive(Debug)]
pub struct Consumer {
    id: u64,
    subscription: Subscription,
}

impl Consumer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn release(&self) {
        self.subscription.unsubscribe();
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Convert into a plain [`Subscription`]
    pub fn into_subscription(self) -> Subscription {
        self.subscription
    }
}
