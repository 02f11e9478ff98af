use crate::core::emitter::Subscription;
use crate::error::Result;

/// Which persistence medium an area models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Local,
    Session,
    Cookie,
    Memory,
    File,
}

/// A string key/value persistence medium
///
/// Mirrors the `getItem`/`setItem`/`removeItem` shape of browser storage.
pub trait StorageArea: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    fn remove_item(&self, key: &str) -> Result<()>;

    /// Every key currently present
    fn keys(&self) -> Result<Vec<String>>;

    fn kind(&self) -> StorageKind;
}

/// Change notification delivered to *other* contexts sharing an area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// `None` when the whole area was cleared
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub kind: StorageKind,
}

/// Source of [`StorageEvent`]s for one execution context
pub trait StorageEventSource: Send + Sync {
    fn subscribe_storage(
        &self,
        listener: Box<dyn Fn(&StorageEvent) + Send + Sync>,
    ) -> Subscription;
}
