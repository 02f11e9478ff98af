use crate::error::SerializeError;
use serde_json::{Map, Value};

/// Key used to wrap non-string values
pub const WRAPPED_VALUE_KEY: &str = "$v";

/// String codec for persisted values
pub trait Serializer: Send + Sync {
    fn serialize(&self, value: &Value) -> Result<String, SerializeError>;

    fn deserialize(&self, raw: &str) -> Result<Value, SerializeError>;
}

/// Default codec used by every store unless configured otherwise
///
/// Strings are stored as-is. Any other value is wrapped as `{"$v": value}`
/// and JSON-encoded, so a stored `"42"` and a stored `42` stay distinct.
///
/// Reading never fails: a payload that is not a `$v` wrapper is returned as a
/// plain string. Because the wrapped value goes through JSON, non-finite
/// floats read back as `null`, missing sequence elements (`None`) as `null`,
/// and dates as their string form. Numbers keep their exact decimal text, so
/// 128-bit integers round-trip without loss.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSerializer;

impl Serializer for DefaultSerializer {
    fn serialize(&self, value: &Value) -> Result<String, SerializeError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => {
                let mut wrapper = Map::with_capacity(1);
                wrapper.insert(WRAPPED_VALUE_KEY.to_string(), other.clone());
                Ok(serde_json::to_string(&Value::Object(wrapper))?)
            }
        }
    }

    fn deserialize(&self, raw: &str) -> Result<Value, SerializeError> {
        if let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(raw) {
            if map.len() == 1 {
                if let Some(inner) = map.remove(WRAPPED_VALUE_KEY) {
                    return Ok(inner);
                }
            }
        }
        Ok(Value::String(raw.to_string()))
    }
}

/// Plain JSON codec without the `$v` wrapper
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Value) -> Result<String, SerializeError> {
        Ok(serde_json::to_string(value)?)
    }

    fn deserialize(&self, raw: &str) -> Result<Value, SerializeError> {
        serde_json::from_str(raw).map_err(|e| SerializeError::Decode(e.to_string()))
    }
}

/// Convert any serializable value into the codec's input
///
/// Fails with [`SerializeError::Encode`] for shapes JSON cannot hold, such as
/// maps with non-string keys.
pub fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, SerializeError> {
    serde_json::to_value(value).map_err(|e| SerializeError::Encode(e.to_string()))
}
