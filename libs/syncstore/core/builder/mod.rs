pub mod states;

use crate::core::broadcast::BroadcastChannel;
use crate::core::store::Store;
use crate::traits::*;
use serde::Serialize;
use states::*;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-state builder for [`Store`]
///
/// The key and the validator are required and tracked in the type, so a
/// store without either does not compile. Serializer and broadcast channel
/// are optional.
///
/// ```rust,ignore
/// let counter = syncstore::store::<i64>()
///     .key("counter")
///     .validator(with_default(0))
///     .broadcast(channel)
///     .build(Arc::new(tab.local()));
/// ```
pub struct StoreBuilder<T, K, V>
where
    K: KeyState,
    V: ValidatorState,
{
    key: K,
    validator: V,
    serializer: Arc<dyn Serializer>,
    broadcast: Option<BroadcastChannel>,
    _value: PhantomData<fn() -> T>,
}

impl<T> StoreBuilder<T, NoKey, NoValidator> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            key: NoKey,
            validator: NoValidator,
            serializer: Arc::new(DefaultSerializer),
            broadcast: None,
            _value: PhantomData,
        }
    }
}

impl<T> Default for StoreBuilder<T, NoKey, NoValidator> {
    fn default() -> Self {
        Self::new()
    }
}

// Key setting
impl<T, V> StoreBuilder<T, NoKey, V>
where
    V: ValidatorState,
{
    pub fn key(self, key: impl Into<String>) -> StoreBuilder<T, HasKey, V> {
        StoreBuilder {
            key: HasKey(key.into()),
            validator: self.validator,
            serializer: self.serializer,
            broadcast: self.broadcast,
            _value: PhantomData,
        }
    }
}

// Validator setting
impl<T, K> StoreBuilder<T, K, NoValidator>
where
    K: KeyState,
{
    pub fn validator(
        self,
        validator: impl Validator<T> + 'static,
    ) -> StoreBuilder<T, K, HasValidator<T>> {
        StoreBuilder {
            key: self.key,
            validator: HasValidator(Arc::new(validator)),
            serializer: self.serializer,
            broadcast: self.broadcast,
            _value: PhantomData,
        }
    }
}

// Optional configuration
impl<T, K, V> StoreBuilder<T, K, V>
where
    K: KeyState,
    V: ValidatorState,
{
    /// Replace the default `$v`-wrapping codec
    pub fn serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    /// Signal other tabs on every write and re-read when they signal
    pub fn broadcast(mut self, channel: BroadcastChannel) -> Self {
        self.broadcast = Some(channel);
        self
    }
}

impl<T> StoreBuilder<T, HasKey, HasValidator<T>>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    /// Bind the store to `area`
    pub fn build(self, area: Arc<dyn StorageArea>) -> Store<T> {
        Store::from_parts(
            self.key.0,
            area,
            self.validator.0,
            self.serializer,
            self.broadcast,
        )
    }
}

/// Start building a [`Store`]
pub fn store<T>() -> StoreBuilder<T, NoKey, NoValidator> {
    StoreBuilder::new()
}
