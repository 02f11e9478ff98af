//! Cross-tab invalidation
//!
//! Every write signals the other tabs by bumping a counter in one shared
//! slot. The payload is `{"name": <entry name>, "id": <counter>}` and only
//! says *which* entry changed: recipients re-read the entry from their own
//! area and never look at a value in the message. Only stores registered
//! under the signalled name re-read; a payload without a name (a bare
//! counter) makes every registered store re-read.

use crate::core::emitter::Subscription;
use crate::error::{Result, SerializeError};
use crate::traits::{StorageArea, StorageEvent, StorageEventSource};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Default storage key of the broadcast slot
pub const DEFAULT_BROADCAST_SLOT: &str = "__syncstore_broadcast__";

/// Something that can re-read an entry and re-emit it
pub trait Revalidate: Send + Sync {
    fn revalidate(&self, name: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    #[serde(default)]
    pub name: Option<String>,
    pub id: u64,
}

struct ChannelInner {
    slot: String,
    area: Arc<dyn StorageArea>,
    counter: AtomicU64,
    stores: Mutex<HashMap<String, Vec<Weak<dyn Revalidate>>>>,
    subscription: Mutex<Option<Subscription>>,
}

impl ChannelInner {
    fn slot_id(&self) -> u64 {
        match self.area.get_item(&self.slot) {
            Ok(Some(raw)) => serde_json::from_str::<BroadcastMessage>(&raw)
                .map(|message| message.id)
                .unwrap_or(0),
            _ => 0,
        }
    }

    fn receive(&self, event: &StorageEvent) {
        if event.key.as_deref() != Some(self.slot.as_str()) {
            return;
        }
        let Some(raw) = event.new_value.as_deref() else {
            return;
        };
        let message: BroadcastMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                debug!("[broadcast] discarding unreadable signal {:?}: {}", raw, e);
                return;
            }
        };
        self.counter.fetch_max(message.id, Ordering::AcqRel);

        let targets: Vec<(String, Arc<dyn Revalidate>)> = {
            let mut stores = self.stores.lock();
            for entries in stores.values_mut() {
                entries.retain(|weak| weak.strong_count() > 0);
            }
            stores.retain(|_, entries| !entries.is_empty());

            stores
                .iter()
                .filter(|(name, _)| message.name.as_ref().map_or(true, |wanted| wanted == *name))
                .flat_map(|(name, entries)| {
                    entries
                        .iter()
                        .filter_map(Weak::upgrade)
                        .map(move |store| (name.clone(), store))
                })
                .collect()
        };

        if targets.is_empty() {
            debug!("[broadcast] no live store for {:?}", message.name);
            return;
        }
        for (name, store) in targets {
            if let Err(e) = store.revalidate(&name) {
                warn!("[broadcast] revalidating {} failed: {}", name, e);
            }
        }
    }
}

/// Invalidation channel over one shared area
///
/// Cloning yields another handle to the same channel.
#[derive(Clone)]
pub struct BroadcastChannel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for BroadcastChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastChannel")
            .field("slot", &self.inner.slot)
            .field("counter", &self.inner.counter.load(Ordering::Relaxed))
            .finish()
    }
}

impl BroadcastChannel {
    /// Channel on the default slot
    pub fn new<A>(area: Arc<A>) -> Self
    where
        A: StorageArea + StorageEventSource + 'static,
    {
        Self::with_slot(area, DEFAULT_BROADCAST_SLOT)
    }

    pub fn with_slot<A>(area: Arc<A>, slot: impl Into<String>) -> Self
    where
        A: StorageArea + StorageEventSource + 'static,
    {
        let source: Arc<A> = Arc::clone(&area);
        let inner = Arc::new(ChannelInner {
            slot: slot.into(),
            area,
            counter: AtomicU64::new(0),
            stores: Mutex::new(HashMap::new()),
            subscription: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let subscription = source.subscribe_storage(Box::new(move |event: &StorageEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.receive(event);
            }
        }));
        *inner.subscription.lock() = Some(subscription);

        Self { inner }
    }

    pub fn slot(&self) -> &str {
        &self.inner.slot
    }

    /// Re-read `store` whenever another tab signals `name`
    pub fn register(&self, name: impl Into<String>, store: Weak<dyn Revalidate>) {
        self.inner
            .stores
            .lock()
            .entry(name.into())
            .or_default()
            .push(store);
    }

    /// Number of live stores registered under `name`
    pub fn registered(&self, name: &str) -> usize {
        self.inner
            .stores
            .lock()
            .get(name)
            .map_or(0, |entries| entries.iter().filter(|w| w.strong_count() > 0).count())
    }

    /// Tell the other tabs that `name` changed
    ///
    /// The id is greater than every id seen in the slot so far, so two tabs
    /// never write the same payload back to back.
    pub fn signal(&self, name: &str) -> Result<u64> {
        let seen = self
            .inner
            .counter
            .load(Ordering::Acquire)
            .max(self.inner.slot_id());
        let id = seen + 1;
        self.inner.counter.fetch_max(id, Ordering::AcqRel);

        let message = BroadcastMessage {
            name: Some(name.to_string()),
            id,
        };
        let payload = serde_json::to_string(&message).map_err(SerializeError::from)?;
        self.inner.area.set_item(&self.inner.slot, &payload)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::Origin;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Probe {
        calls: AtomicUsize,
        names: Mutex<Vec<String>>,
    }

    impl Revalidate for Probe {
        fn revalidate(&self, name: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.names.lock().push(name.to_string());
            Ok(())
        }
    }

    fn register(channel: &BroadcastChannel, name: &str) -> Arc<Probe> {
        let probe = Arc::new(Probe::default());
        let as_dyn: Arc<dyn Revalidate> = probe.clone();
        channel.register(name, Arc::downgrade(&as_dyn));
        probe
    }

    #[test]
    fn test_signal_reaches_only_named_store_in_other_tab() {
        let origin = Origin::new("o");
        let a = origin.open_tab();
        let b = origin.open_tab();
        let channel_a = BroadcastChannel::new(Arc::new(a.local()));
        let channel_b = BroadcastChannel::new(Arc::new(b.local()));

        let counter_a = register(&channel_a, "counter");
        let counter_b = register(&channel_b, "counter");
        let theme_b = register(&channel_b, "theme");

        channel_a.signal("counter").unwrap();

        assert_eq!(counter_a.calls.load(Ordering::SeqCst), 0);
        assert_eq!(counter_b.calls.load(Ordering::SeqCst), 1);
        assert_eq!(theme_b.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ids_increase_across_tabs() {
        let origin = Origin::new("o");
        let a = origin.open_tab();
        let b = origin.open_tab();
        let channel_a = BroadcastChannel::new(Arc::new(a.local()));
        let channel_b = BroadcastChannel::new(Arc::new(b.local()));
        let probe_a = register(&channel_a, "x");

        assert_eq!(channel_a.signal("x").unwrap(), 1);
        assert_eq!(channel_b.signal("x").unwrap(), 2);
        assert_eq!(channel_a.signal("x").unwrap(), 3);
        assert_eq!(probe_a.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_garbage_payload_is_discarded() {
        let origin = Origin::new("o");
        let a = origin.open_tab();
        let b = origin.open_tab();
        let channel_b = BroadcastChannel::new(Arc::new(b.local()));
        let probe = register(&channel_b, "x");

        a.local().set_item(DEFAULT_BROADCAST_SLOT, "not json").unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

        a.local()
            .set_item(DEFAULT_BROADCAST_SLOT, r#"{"id": 7}"#)
            .unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dead_store_is_a_noop() {
        let origin = Origin::new("o");
        let a = origin.open_tab();
        let b = origin.open_tab();
        let channel_a = BroadcastChannel::new(Arc::new(a.local()));
        let channel_b = BroadcastChannel::new(Arc::new(b.local()));
        let probe = register(&channel_b, "x");
        drop(probe);

        channel_a.signal("x").unwrap();
        assert_eq!(channel_b.registered("x"), 0);
    }

    #[test]
    fn test_custom_slot() {
        let origin = Origin::new("o");
        let a = origin.open_tab();
        let b = origin.open_tab();
        let channel_a = BroadcastChannel::with_slot(Arc::new(a.local()), "custom");
        let channel_b = BroadcastChannel::with_slot(Arc::new(b.local()), "custom");
        let probe = register(&channel_b, "x");

        channel_a.signal("x").unwrap();
        assert_eq!(channel_a.slot(), "custom");
        assert!(b.local().get_item("custom").unwrap().is_some());
        assert_eq!(*probe.names.lock(), vec!["x".to_string()]);
    }
}
