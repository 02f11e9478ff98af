use crate::core::emitter::Subscription;
use crate::error::{Result, SerializeError, StoreError};
use crate::traits::{StorageArea, StorageEvent, StorageEventSource, StorageKind};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Durable area backed by one JSON file
///
/// The whole map is rewritten on every change: serialized into a temporary
/// file next to the target, then renamed over it, so a crash never leaves a
/// half-written file behind.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open the area at `path`, loading existing entries
    ///
    /// A missing or empty file is an empty area.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let items = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(SerializeError::from)?
            }
        } else {
            BTreeMap::new()
        };

        debug!("Loaded {} entries from {:?}", items.len(), path);
        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let json = serde_json::to_string_pretty(items).map_err(SerializeError::from)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(json.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path)
            .map_err(|e| StoreError::Io(e.error))?;

        debug!("Saved {} entries to {:?}", items.len(), self.path);
        Ok(())
    }
}

impl StorageArea for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.lock();
        if items.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        let previous = items.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&items) {
            match previous {
                Some(old) => items.insert(key.to_string(), old),
                None => items.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self.items.lock();
        let Some(previous) = items.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.persist(&items) {
            items.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.items.lock().keys().cloned().collect())
    }

    fn kind(&self) -> StorageKind {
        StorageKind::File
    }
}

impl StorageEventSource for FileStorage {
    /// Other processes writing the same file are not watched
    fn subscribe_storage(
        &self,
        _listener: Box<dyn Fn(&StorageEvent) + Send + Sync>,
    ) -> Subscription {
        Subscription::empty()
    }
}
