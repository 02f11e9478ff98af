use crate::core::config::ConfigError;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// One segment of the path to an offending value inside a raw input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, ".{}", key),
            PathSegment::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// A single problem reported by a validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub path: Vec<PathSegment>,
    pub message: String,
}

impl Issue {
    /// Issue attached to the root of the input
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }

    /// Issue attached to a nested location
    pub fn at(path: Vec<PathSegment>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }

    /// Render the path as `$.a[0].b`
    pub fn path_string(&self) -> String {
        let mut out = String::from("$");
        for segment in &self.path {
            out.push_str(&segment.to_string());
        }
        out
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path_string(), self.message)
    }
}

/// Raised when a raw value fails the configured validator
///
/// Carries every reported issue together with the input that produced them.
/// `input` is `None` when the value was absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub issues: Vec<Issue>,
    pub input: Option<Value>,
}

impl ValidationError {
    pub fn new(issues: Vec<Issue>, input: Option<Value>) -> Self {
        Self { issues, input }
    }

    /// Shorthand for a single root-level issue
    pub fn message(message: impl Into<String>, input: Option<&Value>) -> Self {
        Self {
            issues: vec![Issue::new(message)],
            input: input.cloned(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed")?;
        for (i, issue) in self.issues.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, issue)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Failure of the string codec used for persisted values
#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for SerializeError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            SerializeError::Decode(e.to_string())
        } else {
            SerializeError::Encode(e.to_string())
        }
    }
}

/// Main error type for syncstore
#[derive(Error, Debug)]
pub enum StoreError {
    /// Persisted or incoming value failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Value could not be encoded or decoded
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    /// The persistence medium rejected an operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// Name is not part of a multi-key store
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    /// A named state was requested with a different type than it holds
    #[error("Type mismatch for '{name}': expected {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    /// Native resource could not be created, attached, or used
    #[error("Resource error: {0}")]
    Resource(String),

    /// File-backed storage I/O
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl StoreError {
    /// Check whether this error is a validation failure
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }

    /// Borrow the validation error, if this is one
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            StoreError::Validation(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for syncstore operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Detect a validation error anywhere in an error's source chain
///
/// Works on any boxed or wrapped error (for example an `anyhow::Error`
/// turned into `&dyn Error`), so callers do not need to know which layer
/// produced it.
pub fn is_validation_error(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<ValidationError>().is_some() {
            return true;
        }
        if let Some(store) = e.downcast_ref::<StoreError>() {
            if store.is_validation() {
                return true;
            }
        }
        current = e.source();
    }
    false
}
