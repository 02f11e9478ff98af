//! Several named entries behind one store
//!
//! A [`MultiStore`] keeps the current validated value of every declared
//! entry in memory, notifies per entry through one [`ChannelEmitter`], and
//! can be seeded from an external raw snapshot (a server's cookie header,
//! say). Re-seeding re-validates and re-emits only the entries whose raw
//! string changed since the previous seed.

use crate::core::broadcast::{BroadcastChannel, Revalidate};
use crate::core::cookies::parse_cookie_header;
use crate::core::emitter::{ChannelEmitter, Subscription};
use crate::error::{Result, SerializeError, StoreError, ValidationError};
use crate::traits::serializer::to_value;
use crate::traits::{DefaultSerializer, Serializer, StorageArea, Validator};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

type EntryValidator = Arc<dyn Validator<Value>>;

/// Erase the typed output of `validator` into a JSON value
fn erase<V, T>(validator: V) -> EntryValidator
where
    V: Validator<T> + 'static,
    T: Serialize,
{
    Arc::new(move |raw: Option<&Value>| -> std::result::Result<Value, ValidationError> {
        let value = validator.validate(raw)?;
        to_value(&value).map_err(|e| ValidationError::message(e.to_string(), raw))
    })
}

/// Builder for [`MultiStore`]
pub struct MultiStoreBuilder {
    entries: Vec<(String, EntryValidator)>,
    serializer: Arc<dyn Serializer>,
    broadcast: Option<BroadcastChannel>,
}

impl Default for MultiStoreBuilder {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            serializer: Arc::new(DefaultSerializer),
            broadcast: None,
        }
    }
}

impl MultiStoreBuilder {
    /// Declare an entry; a later declaration of the same name replaces it
    pub fn entry<T, V>(mut self, name: impl Into<String>, validator: V) -> Self
    where
        V: Validator<T> + 'static,
        T: Serialize + 'static,
    {
        let name = name.into();
        let validator = erase(validator);
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = validator,
            None => self.entries.push((name, validator)),
        }
        self
    }

    pub fn serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    pub fn broadcast(mut self, channel: BroadcastChannel) -> Self {
        self.broadcast = Some(channel);
        self
    }

    pub fn build(self, area: Arc<dyn StorageArea>) -> MultiStore {
        let inner = Arc::new(MultiInner {
            area,
            entries: self.entries,
            serializer: self.serializer,
            values: Mutex::new(HashMap::new()),
            seeds: Mutex::new(HashMap::new()),
            emitter: ChannelEmitter::new(),
            broadcast: self.broadcast,
        });

        if let Some(channel) = &inner.broadcast {
            let as_dyn: Arc<dyn Revalidate> = inner.clone();
            for (name, _) in &inner.entries {
                channel.register(name.clone(), Arc::downgrade(&as_dyn));
            }
        }
        MultiStore { inner }
    }
}

struct MultiInner {
    area: Arc<dyn StorageArea>,
    entries: Vec<(String, EntryValidator)>,
    serializer: Arc<dyn Serializer>,
    values: Mutex<HashMap<String, Value>>,
    seeds: Mutex<HashMap<String, Option<String>>>,
    emitter: ChannelEmitter<String, Value>,
    broadcast: Option<BroadcastChannel>,
}

impl MultiInner {
    fn validator(&self, name: &str) -> Result<&EntryValidator> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, validator)| validator)
            .ok_or_else(|| StoreError::UnknownKey(name.to_string()))
    }

    fn validate_raw(&self, name: &str, raw: Option<&str>) -> Result<Value> {
        let validator = self.validator(name)?;
        let value: Option<Value> = raw.map(|raw| {
            self.serializer
                .deserialize(raw)
                .unwrap_or_else(|_| Value::String(raw.to_string()))
        });
        Ok(validator.validate(value.as_ref())?)
    }

    /// Authoritative raw string: the area first, the seed when the area has none
    fn raw(&self, name: &str) -> Result<Option<String>> {
        if let Some(raw) = self.area.get_item(name)? {
            return Ok(Some(raw));
        }
        Ok(self.seeds.lock().get(name).cloned().flatten())
    }

    fn load(&self, name: &str) -> Result<Value> {
        let raw = self.raw(name)?;
        let value = self.validate_raw(name, raw.as_deref())?;
        self.values.lock().insert(name.to_string(), value.clone());
        Ok(value)
    }

    fn get(&self, name: &str) -> Result<Value> {
        self.validator(name)?;
        let cached = self.values.lock().get(name).cloned();
        match cached {
            Some(value) => Ok(value),
            None => self.load(name),
        }
    }

    fn publish(&self, name: &str, value: &Value) {
        self.emitter.emit(&name.to_string(), value);
        if let Some(channel) = &self.broadcast {
            if let Err(e) = channel.signal(name) {
                warn!("[multi-store] broadcast of {} failed: {}", name, e);
            }
        }
    }

    fn reset(&self, name: &str) -> Result<Value> {
        self.area.remove_item(name)?;
        self.seeds.lock().remove(name);
        let value = self.validate_raw(name, None)?;
        self.values.lock().insert(name.to_string(), value.clone());
        self.publish(name, &value);
        Ok(value)
    }
}

impl Revalidate for MultiInner {
    fn revalidate(&self, name: &str) -> Result<()> {
        let value = self.load(name)?;
        debug!("[multi-store] revalidated {}", name);
        self.emitter.emit(&name.to_string(), &value);
        Ok(())
    }
}

/// Store managing several named entries
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct MultiStore {
    inner: Arc<MultiInner>,
}

impl std::fmt::Debug for MultiStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiStore")
            .field("entries", &self.names())
            .finish()
    }
}

impl MultiStore {
    pub fn builder() -> MultiStoreBuilder {
        MultiStoreBuilder::default()
    }

    /// Declared entry names, in declaration order
    pub fn names(&self) -> Vec<&str> {
        self.inner
            .entries
            .iter()
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        self.inner.get(name)
    }

    /// Current value of `name` converted to `T`
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.get(name)?;
        serde_json::from_value(value)
            .map_err(|e| StoreError::Serialize(SerializeError::Decode(e.to_string())))
    }

    /// Persist `value` under `name` and notify
    ///
    /// The cached and emitted value is what the entry's validator makes of
    /// the persisted string, which is also returned.
    pub fn set(&self, name: &str, value: impl Serialize) -> Result<Value> {
        self.inner.validator(name)?;
        let raw = self.inner.serializer.serialize(&to_value(&value)?)?;
        self.inner.area.set_item(name, &raw)?;
        let stored = self.inner.validate_raw(name, Some(&raw))?;
        self.inner
            .values
            .lock()
            .insert(name.to_string(), stored.clone());
        self.inner.publish(name, &stored);
        Ok(stored)
    }

    /// Functional update of one entry
    pub fn update(&self, name: &str, f: impl FnOnce(Value) -> Value) -> Result<Value> {
        let next = f(self.get(name)?);
        self.set(name, &next)
    }

    /// Remove `name`, emitting what its validator makes of the absence
    pub fn remove(&self, name: &str) -> Result<Value> {
        self.inner.reset(name)
    }

    /// Reset every entry, or only `names`
    ///
    /// Names are checked before anything is removed.
    pub fn clear(&self, names: Option<&[&str]>) -> Result<()> {
        let targets: Vec<String> = match names {
            Some(names) => {
                for name in names {
                    self.inner.validator(name)?;
                }
                names.iter().map(|n| n.to_string()).collect()
            }
            None => self.inner.entries.iter().map(|(n, _)| n.clone()).collect(),
        };
        for name in targets {
            self.inner.reset(&name)?;
        }
        Ok(())
    }

    pub fn subscribe(
        &self,
        name: &str,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Result<Subscription> {
        self.inner.validator(name)?;
        Ok(self.inner.emitter.subscribe(name.to_string(), listener))
    }

    /// Values of every entry, in declaration order
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        let entries = self
            .inner
            .entries
            .iter()
            .map(|(name, _)| Ok((name.clone(), self.inner.get(name)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(StoreSnapshot { entries })
    }

    /// Seed raw values from an external snapshot
    ///
    /// Entries missing from `raw` count as absent. Only entries whose raw
    /// string differs from the previous seed are re-validated and emitted;
    /// returns their names. Undeclared names are ignored. A seed is recorded
    /// only once it validates, and a value already in the area takes
    /// precedence over it.
    pub fn seed<I, K, S>(&self, raw: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = (K, S)>,
        K: Into<String>,
        S: Into<String>,
    {
        let mut incoming: HashMap<String, String> = HashMap::new();
        for (name, value) in raw {
            incoming.entry(name.into()).or_insert_with(|| value.into());
        }

        let mut changed = Vec::new();
        for (name, _) in &self.inner.entries {
            let next = incoming.get(name).cloned();
            let previous = self.inner.seeds.lock().get(name).cloned().flatten();
            if previous == next {
                continue;
            }
            // a persisted value still wins over the seed
            let raw = match self.inner.area.get_item(name)? {
                Some(stored) => Some(stored),
                None => next.clone(),
            };
            let value = self.inner.validate_raw(name, raw.as_deref())?;
            self.inner.seeds.lock().insert(name.clone(), next);
            self.inner.values.lock().insert(name.clone(), value.clone());
            self.inner.emitter.emit(name, &value);
            changed.push(name.clone());
        }
        Ok(changed)
    }

    /// Seed from a `Cookie` header, percent-decoding values
    pub fn seed_cookie_header(&self, header: &str) -> Result<Vec<String>> {
        let pairs = parse_cookie_header(header).into_iter().map(|(name, value)| {
            let decoded = urlencoding::decode(&value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.clone());
            (name, decoded)
        });
        self.seed(pairs)
    }
}

/// Point-in-time values of a [`MultiStore`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    entries: Vec<(String, Value)>,
}

impl StoreSnapshot {
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|(entry, _)| entry == name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
