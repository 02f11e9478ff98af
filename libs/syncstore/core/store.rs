//! Typed binding of one persisted entry
//!
//! Writes go serialize → persist → notify local subscribers → signal other
//! tabs. Reads go raw string → deserialize → validate, every time, so `get`
//! never hands out a value the validator has not accepted.

use crate::core::broadcast::{BroadcastChannel, Revalidate};
use crate::core::emitter::{Emitter, Subscription};
use crate::error::Result;
use crate::traits::serializer::to_value;
use crate::traits::{Serializer, StorageArea, Validator};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

struct StoreInner<T> {
    key: String,
    area: Arc<dyn StorageArea>,
    validator: Arc<dyn Validator<T>>,
    serializer: Arc<dyn Serializer>,
    emitter: Emitter<T>,
    broadcast: Option<BroadcastChannel>,
}

impl<T> StoreInner<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    fn read(&self, raw: Option<&str>) -> Result<T> {
        let value: Option<Value> = raw.map(|raw| {
            self.serializer
                .deserialize(raw)
                .unwrap_or_else(|_| Value::String(raw.to_string()))
        });
        Ok(self.validator.validate(value.as_ref())?)
    }

    fn current(&self) -> Result<T> {
        let raw = self.area.get_item(&self.key)?;
        self.read(raw.as_deref())
    }

    fn signal(&self) {
        if let Some(channel) = &self.broadcast {
            if let Err(e) = channel.signal(&self.key) {
                warn!("[store {}] broadcast failed: {}", self.key, e);
            }
        }
    }
}

impl<T> Revalidate for StoreInner<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    fn revalidate(&self, _name: &str) -> Result<()> {
        let value = self.current()?;
        debug!("[store {}] revalidated", self.key);
        self.emitter.emit(&value);
        Ok(())
    }
}

/// One named, validated, persisted value
///
/// Cloning yields another handle to the same store.
pub struct Store<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("key", &self.inner.key)
            .field("kind", &self.inner.area.kind())
            .field("subscribers", &self.inner.emitter.listener_count())
            .finish()
    }
}

impl<T> Store<T>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    pub(crate) fn from_parts(
        key: String,
        area: Arc<dyn StorageArea>,
        validator: Arc<dyn Validator<T>>,
        serializer: Arc<dyn Serializer>,
        broadcast: Option<BroadcastChannel>,
    ) -> Self {
        let inner = Arc::new(StoreInner {
            key,
            area,
            validator,
            serializer,
            emitter: Emitter::new(),
            broadcast,
        });

        if let Some(channel) = &inner.broadcast {
            let as_dyn: Arc<dyn Revalidate> = inner.clone();
            channel.register(inner.key.clone(), Arc::downgrade(&as_dyn));
        }
        Self { inner }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Current validated value
    ///
    /// Fails with [`StoreError::Validation`](crate::error::StoreError::Validation)
    /// when the validator rejects what is stored.
    pub fn get(&self) -> Result<T> {
        self.inner.current()
    }

    /// Validate `raw` as if it were the stored string
    ///
    /// Used to render with a value that came from somewhere else, such as a
    /// cookie header received by a server.
    pub fn get_from(&self, raw: Option<&str>) -> Result<T> {
        self.inner.read(raw)
    }

    /// Persist `value` and notify subscribers and other tabs
    ///
    /// Subscribers receive what the validator makes of the persisted string,
    /// the same value `get` and other tabs will see; it is also returned.
    pub fn set(&self, value: T) -> Result<T> {
        let raw = self.inner.serializer.serialize(&to_value(&value)?)?;
        self.inner.area.set_item(&self.inner.key, &raw)?;
        let stored = self.inner.read(Some(&raw))?;
        self.inner.emitter.emit(&stored);
        self.inner.signal();
        Ok(stored)
    }

    /// Functional update from the current validated value
    ///
    /// Consecutive updates compose: the second sees the first's result.
    pub fn update(&self, f: impl FnOnce(T) -> T) -> Result<T> {
        let next = f(self.get()?);
        self.set(next)
    }

    /// `None` removes the entry
    pub fn set_optional(&self, value: Option<T>) -> Result<()> {
        match value {
            Some(value) => self.set(value).map(|_| ()),
            None => self.remove().map(|_| ()),
        }
    }

    /// Delete the entry and emit what the validator makes of its absence
    pub fn remove(&self) -> Result<T> {
        self.inner.area.remove_item(&self.inner.key)?;
        let value = self.inner.read(None)?;
        self.inner.emitter.emit(&value);
        self.inner.signal();
        Ok(value)
    }

    /// Same as [`remove`](Self::remove)
    pub fn clear(&self) -> Result<T> {
        self.remove()
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.inner.emitter.subscribe(listener)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.emitter.listener_count()
    }

    /// Re-read the stored value and emit it
    pub fn revalidate(&self) -> Result<T> {
        let value = self.inner.current()?;
        self.inner.emitter.emit(&value);
        Ok(value)
    }
}
