//! Shared observers (intersection, resize, mutation)
//!
//! Native observers share one shape: a constructor taking a callback and
//! options, then `observe`/`unobserve`/`disconnect`. One native observer is
//! created per (target, options) pair and disconnected when its last
//! consumer leaves.

use crate::error::Result;
use crate::registry::identity::{IdentityKey, Identify};
use crate::registry::instances::{Consumer, EventSink, InstanceRegistry};
use crate::traits::NativeResource;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// A live native observer
pub trait NativeObserver<T>: Send + Sync {
    fn observe(&self, target: &T);

    fn unobserve(&self, target: &T);

    fn disconnect(&self);
}

/// Callback a native observer invokes with a batch of entries
pub type ObserverCallback<E> = Box<dyn Fn(&[E]) + Send + Sync>;

/// Factory for one kind of native observer
pub trait ObserverBackend: Send + Sync + 'static {
    type Target: Identify + Send + Sync + 'static;
    type Options: Serialize + Clone + Send + Sync + 'static;
    type Entry: Clone + Send + Sync + 'static;

    /// Name used in identity keys ("intersection", "resize", ...)
    fn kind(&self) -> &'static str;

    fn create(
        &self,
        options: &Self::Options,
        callback: ObserverCallback<Self::Entry>,
    ) -> Result<Box<dyn NativeObserver<Self::Target>>>;
}

/// Options for intersection observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntersectionOptions {
    /// Root element id; `None` observes against the viewport
    pub root: Option<u64>,
    pub root_margin: String,
    pub thresholds: Vec<f64>,
}

impl Default for IntersectionOptions {
    fn default() -> Self {
        Self {
            root: None,
            root_margin: "0px".to_string(),
            thresholds: vec![0.0],
        }
    }
}

/// Which box a resize observer reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeBox {
    #[default]
    ContentBox,
    BorderBox,
    DevicePixelContentBox,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResizeOptions {
    #[serde(rename = "box")]
    pub box_model: ResizeBox,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationOptions {
    pub attributes: bool,
    pub attribute_filter: Option<Vec<String>>,
    pub attribute_old_value: bool,
    pub character_data: bool,
    pub character_data_old_value: bool,
    pub child_list: bool,
    pub subtree: bool,
}

/// One native observer watching one target
pub struct ObserverResource<B: ObserverBackend> {
    backend: Arc<B>,
    target: Arc<B::Target>,
    options: B::Options,
    native: Mutex<Option<Box<dyn NativeObserver<B::Target>>>>,
}

impl<B: ObserverBackend> NativeResource for ObserverResource<B> {
    type Event = Vec<B::Entry>;

    fn attach(&self, sink: EventSink<Vec<B::Entry>>) -> Result<()> {
        let callback: ObserverCallback<B::Entry> =
            Box::new(move |entries: &[B::Entry]| sink.emit(&entries.to_vec()));
        let observer = self.backend.create(&self.options, callback)?;
        observer.observe(&self.target);
        *self.native.lock() = Some(observer);
        Ok(())
    }

    fn detach(&self) {
        if let Some(observer) = self.native.lock().take() {
            observer.unobserve(&self.target);
            observer.disconnect();
        }
    }
}

/// Registry of shared observers for one backend
pub struct ObserverRegistry<B: ObserverBackend> {
    backend: Arc<B>,
    instances: InstanceRegistry<ObserverResource<B>>,
}

impl<B: ObserverBackend> Clone for ObserverRegistry<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            instances: self.instances.clone(),
        }
    }
}

impl<B: ObserverBackend> std::fmt::Debug for ObserverRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("kind", &self.backend.kind())
            .field("instances", &self.instances)
            .finish()
    }
}

impl<B: ObserverBackend> ObserverRegistry<B> {
    pub fn new(backend: B) -> Self {
        let name = format!("{}-observer", backend.kind());
        Self {
            backend: Arc::new(backend),
            instances: InstanceRegistry::new(name),
        }
    }

    pub fn key(&self, target: &B::Target, options: &B::Options) -> Result<IdentityKey> {
        IdentityKey::for_target(target.target_id(), self.backend.kind(), options)
    }

    /// Observe `target`; `callback` receives each batch of entries
    pub fn observe(
        &self,
        target: &Arc<B::Target>,
        options: B::Options,
        callback: impl Fn(&Vec<B::Entry>) + Send + Sync + 'static,
    ) -> Result<Consumer> {
        let key = self.key(target, &options)?;
        let backend = Arc::clone(&self.backend);
        let target = Arc::clone(target);
        self.instances.subscribe(
            key,
            move || {
                Ok(ObserverResource {
                    backend,
                    target,
                    options,
                    native: Mutex::new(None),
                })
            },
            callback,
        )
    }

    pub fn instances(&self) -> &InstanceRegistry<ObserverResource<B>> {
        &self.instances
    }

    pub fn reset(&self) {
        self.instances.reset();
    }
}
