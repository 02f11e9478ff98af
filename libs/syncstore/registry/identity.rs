//! Identity keys for shared instances
//!
//! Two requests share one native resource exactly when their keys are equal.
//! A key combines the identity of the target object (a [`TargetId`], never
//! structural equality) with the option fields that affect the native
//! resource. Options are serialized as canonical JSON with object keys sorted
//! at every depth, so field order never changes the key.

use crate::error::{Result, SerializeError};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

/// Per-object unique id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TargetId(u64);

impl TargetId {
    /// Allocate an id no other object has
    pub fn fresh() -> Self {
        TargetId(NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Objects that can be the target of a shared instance
pub trait Identify {
    fn target_id(&self) -> TargetId;
}

/// Deterministic, order-independent identity of a shared instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Key for `kind` events/observations on `target` with `options`
    pub fn for_target(target: TargetId, kind: &str, options: &impl Serialize) -> Result<Self> {
        let options = serde_json::to_value(options).map_err(SerializeError::from)?;
        Self::from_value(&json!({
            "target": target.get(),
            "kind": kind,
            "options": options,
        }))
    }

    /// Key built from arbitrary serializable parts
    pub fn from_parts(parts: &impl Serialize) -> Result<Self> {
        let value = serde_json::to_value(parts).map_err(SerializeError::from)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let canonical = canonicalize(value);
        let text = serde_json::to_string(&canonical).map_err(SerializeError::from)?;
        Ok(IdentityKey(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rebuild `value` with object keys in sorted order at every depth
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
