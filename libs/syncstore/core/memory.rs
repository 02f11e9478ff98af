//! In-memory storage areas
//!
//! [`MemoryStorage`] is a lone area with nobody to notify (the fallback used
//! when no persistence medium exists). [`Origin`] models several tabs sharing
//! one local area: a write through one tab fires a [`StorageEvent`] in every
//! other tab of the origin, never in the writer. Session areas belong to a
//! single tab and fire nothing.

use crate::core::emitter::{Emitter, Subscription};
use crate::error::Result;
use crate::traits::{StorageArea, StorageEvent, StorageEventSource, StorageKind};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type Items = Mutex<BTreeMap<String, String>>;

/// Standalone in-memory area
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Items,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl StorageArea for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.items.lock().keys().cloned().collect())
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Memory
    }
}

impl StorageEventSource for MemoryStorage {
    /// No other context shares this area, so nothing is ever delivered
    fn subscribe_storage(
        &self,
        _listener: Box<dyn Fn(&StorageEvent) + Send + Sync>,
    ) -> Subscription {
        Subscription::empty()
    }
}

struct OriginInner {
    name: String,
    local: Items,
    next_tab: AtomicU64,
    tabs: Mutex<Vec<(u64, Emitter<StorageEvent>)>>,
}

impl OriginInner {
    /// Deliver `event` to every tab except `from`
    fn dispatch(&self, from: u64, event: &StorageEvent) {
        let targets: Vec<Emitter<StorageEvent>> = self
            .tabs
            .lock()
            .iter()
            .filter(|(id, _)| *id != from)
            .map(|(_, events)| events.clone())
            .collect();
        for events in targets {
            events.emit(event);
        }
    }
}

/// A set of tabs sharing one local area
///
/// Cloning yields another handle to the same origin.
#[derive(Clone)]
pub struct Origin {
    inner: Arc<OriginInner>,
}

impl std::fmt::Debug for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Origin")
            .field("name", &self.inner.name)
            .field("tabs", &self.tab_count())
            .finish()
    }
}

impl Origin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(OriginInner {
                name: name.into(),
                local: Mutex::new(BTreeMap::new()),
                next_tab: AtomicU64::new(1),
                tabs: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Open a new execution context on this origin
    pub fn open_tab(&self) -> Tab {
        let id = self.inner.next_tab.fetch_add(1, Ordering::Relaxed);
        let events = Emitter::new();
        self.inner.tabs.lock().push((id, events.clone()));
        debug!("[origin {}] opened tab {}", self.inner.name, id);
        Tab {
            inner: Arc::new(TabInner {
                id,
                origin: Arc::clone(&self.inner),
                events,
                session: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    pub fn tab_count(&self) -> usize {
        self.inner.tabs.lock().len()
    }
}

struct TabInner {
    id: u64,
    origin: Arc<OriginInner>,
    events: Emitter<StorageEvent>,
    session: Items,
}

impl Drop for TabInner {
    fn drop(&mut self) {
        self.origin.tabs.lock().retain(|(id, _)| *id != self.id);
        debug!("[origin {}] closed tab {}", self.origin.name, self.id);
    }
}

/// One execution context; the tab closes when its last handle is dropped
#[derive(Clone)]
pub struct Tab {
    inner: Arc<TabInner>,
}

impl std::fmt::Debug for Tab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tab").field("id", &self.inner.id).finish()
    }
}

impl Tab {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The origin-wide area, as seen from this tab
    pub fn local(&self) -> TabStorage {
        TabStorage {
            tab: Arc::clone(&self.inner),
            kind: StorageKind::Local,
        }
    }

    /// This tab's private area
    pub fn session(&self) -> TabStorage {
        TabStorage {
            tab: Arc::clone(&self.inner),
            kind: StorageKind::Session,
        }
    }
}

/// A local or session area accessed through one tab
#[derive(Clone)]
pub struct TabStorage {
    tab: Arc<TabInner>,
    kind: StorageKind,
}

impl std::fmt::Debug for TabStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabStorage")
            .field("tab", &self.tab.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl TabStorage {
    fn items(&self) -> &Items {
        match self.kind {
            StorageKind::Session => &self.tab.session,
            _ => &self.tab.origin.local,
        }
    }

    /// Apply a write and tell the other tabs when the value really changed
    fn write(&self, key: &str, new_value: Option<&str>) {
        let old_value = {
            let mut items = self.items().lock();
            match new_value {
                Some(value) => items.insert(key.to_string(), value.to_string()),
                None => items.remove(key),
            }
        };

        if self.kind != StorageKind::Local || old_value.as_deref() == new_value {
            return;
        }
        let event = StorageEvent {
            key: Some(key.to_string()),
            old_value,
            new_value: new_value.map(str::to_string),
            kind: self.kind,
        };
        self.tab.origin.dispatch(self.tab.id, &event);
    }
}

impl StorageArea for TabStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items().lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.write(key, Some(value));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.write(key, None);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.items().lock().keys().cloned().collect())
    }

    fn kind(&self) -> StorageKind {
        self.kind
    }
}

impl StorageEventSource for TabStorage {
    fn subscribe_storage(
        &self,
        listener: Box<dyn Fn(&StorageEvent) + Send + Sync>,
    ) -> Subscription {
        let kind = self.kind;
        self.tab.events.subscribe(move |event: &StorageEvent| {
            if event.kind == kind {
                listener(event);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(area: &TabStorage) -> (Arc<Mutex<Vec<StorageEvent>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = area.subscribe_storage(Box::new(move |e| sink.lock().push(e.clone())));
        (seen, sub)
    }

    #[test]
    fn test_memory_storage_basic_ops() {
        let area = MemoryStorage::new();
        assert_eq!(area.get_item("a").unwrap(), None);
        area.set_item("a", "1").unwrap();
        area.set_item("b", "2").unwrap();
        assert_eq!(area.get_item("a").unwrap().as_deref(), Some("1"));
        assert_eq!(area.keys().unwrap(), vec!["a", "b"]);
        area.remove_item("a").unwrap();
        assert_eq!(area.len(), 1);
    }

    #[test]
    fn test_local_area_is_shared_and_events_skip_writer() {
        let origin = Origin::new("https://app.test");
        let a = origin.open_tab();
        let b = origin.open_tab();
        let (seen_a, _sa) = recorder(&a.local());
        let (seen_b, _sb) = recorder(&b.local());

        a.local().set_item("theme", "dark").unwrap();

        assert_eq!(b.local().get_item("theme").unwrap().as_deref(), Some("dark"));
        assert!(seen_a.lock().is_empty());
        let events = seen_b.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key.as_deref(), Some("theme"));
        assert_eq!(events[0].old_value, None);
        assert_eq!(events[0].new_value.as_deref(), Some("dark"));
    }

    #[test]
    fn test_unchanged_write_fires_nothing() {
        let origin = Origin::new("o");
        let a = origin.open_tab();
        let b = origin.open_tab();
        let (seen_b, _sb) = recorder(&b.local());

        a.local().set_item("k", "v").unwrap();
        a.local().set_item("k", "v").unwrap();
        a.local().remove_item("missing").unwrap();
        assert_eq!(seen_b.lock().len(), 1);
    }

    #[test]
    fn test_session_areas_are_per_tab_and_silent() {
        let origin = Origin::new("o");
        let a = origin.open_tab();
        let b = origin.open_tab();
        let (seen_b, _sb) = recorder(&b.session());

        a.session().set_item("draft", "x").unwrap();
        assert_eq!(b.session().get_item("draft").unwrap(), None);
        assert_eq!(a.local().get_item("draft").unwrap(), None);
        assert!(seen_b.lock().is_empty());
    }

    #[test]
    fn test_closed_tab_leaves_origin() {
        let origin = Origin::new("o");
        let a = origin.open_tab();
        {
            let _b = origin.open_tab();
            assert_eq!(origin.tab_count(), 2);
        }
        assert_eq!(origin.tab_count(), 1);
        a.local().set_item("k", "v").unwrap();
    }
}
