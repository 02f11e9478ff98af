use crate::core::emitter::{Emitter, Subscription};
use crate::error::{Result, StoreError};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

struct StateInner<T> {
    name: String,
    value: Mutex<T>,
    emitter: Emitter<T>,
}

/// Shared in-memory value, keyed by name, with no persistence
///
/// Every handle for the same name in the same [`GlobalStates`] sees the same
/// value.
pub struct GlobalState<T> {
    inner: Arc<StateInner<T>>,
}

impl<T> Clone for GlobalState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for GlobalState<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalState")
            .field("name", &self.inner.name)
            .field("value", &*self.inner.value.lock())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> GlobalState<T> {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn get(&self) -> T {
        self.inner.value.lock().clone()
    }

    pub fn set(&self, value: T) {
        *self.inner.value.lock() = value.clone();
        self.inner.emitter.emit(&value);
    }

    /// Functional update; consecutive updates compose
    ///
    /// Runs `f` under the state's lock, so `f` must not touch this state.
    pub fn update(&self, f: impl FnOnce(T) -> T) -> T {
        let next = {
            let mut value = self.inner.value.lock();
            let next = f(value.clone());
            *value = next.clone();
            next
        };
        self.inner.emitter.emit(&next);
        next
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.inner.emitter.subscribe(listener)
    }
}

type AnyState = Arc<dyn Any + Send + Sync>;

/// Registry of named global states
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct GlobalStates {
    states: Arc<Mutex<HashMap<String, AnyState>>>,
}

impl std::fmt::Debug for GlobalStates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalStates")
            .field("states", &self.len())
            .finish()
    }
}

impl GlobalStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// State registered under `name`, created from `init` on first use
    ///
    /// Asking for an existing name with a different `T` is a
    /// [`StoreError::TypeMismatch`].
    pub fn state<T>(&self, name: &str, init: impl FnOnce() -> T) -> Result<GlobalState<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut states = self.states.lock();
        if let Some(existing) = states.get(name) {
            let inner = Arc::clone(existing)
                .downcast::<StateInner<T>>()
                .map_err(|_| StoreError::TypeMismatch {
                    name: name.to_string(),
                    expected: std::any::type_name::<T>(),
                })?;
            return Ok(GlobalState { inner });
        }

        let inner = Arc::new(StateInner {
            name: name.to_string(),
            value: Mutex::new(init()),
            emitter: Emitter::new(),
        });
        states.insert(name.to_string(), inner.clone());
        debug!("[global] created {}", name);
        Ok(GlobalState { inner })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every state; existing handles keep their value but are no
    /// longer shared with new ones
    pub fn reset(&self) {
        self.states.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn test_same_name_same_state() {
        let states = GlobalStates::new();
        let a = states.state("count", || 0i32).unwrap();
        let b = states.state("count", || 99i32).unwrap();
        a.set(5);
        assert_eq!(b.get(), 5);
        assert_eq!(states.len(), 1);
    }

    #[test]
    fn test_type_mismatch() {
        let states = GlobalStates::new();
        let _ = states.state("count", || 0i32).unwrap();
        let err = states.state("count", String::new).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));
    }

    #[test]
    fn test_updates_compose_and_notify() {
        let states = GlobalStates::new();
        let count = states.state("count", || 0i32).unwrap();
        let last = Arc::new(AtomicI32::new(-1));
        let l = Arc::clone(&last);
        let _sub = count.subscribe(move |v| l.store(*v, Ordering::SeqCst));

        count.update(|c| c + 1);
        count.update(|c| c + 1);
        assert_eq!(count.get(), 2);
        assert_eq!(last.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reset_detaches_new_handles() {
        let states = GlobalStates::new();
        let old = states.state("flag", || false).unwrap();
        old.set(true);
        states.reset();
        assert!(states.is_empty());

        let fresh = states.state("flag", || false).unwrap();
        assert!(!fresh.get());
        assert!(old.get());
    }
}
