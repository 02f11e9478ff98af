//! # Syncstore Traits
//!
//! Seams between the store core and its environment:
//!
//! - **Validator**: raw value → trusted typed value (plain functions or schemas)
//! - **Serializer**: value ⇄ persisted string
//! - **StorageArea** / **StorageEventSource**: the persistence medium and its
//!   cross-context change notifications
//! - **NativeResource**: a native object shared by the instance registry
//! - **ReconnectionStrategy**: opt-in reconnect policy for shared sockets

pub mod error;
pub mod reconnect;
pub mod resource;
pub mod serializer;
pub mod storage;
pub mod validator;

pub use error::{
    is_validation_error, Issue, PathSegment, Result, SerializeError, StoreError, ValidationError,
};
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use resource::NativeResource;
pub use serializer::{DefaultSerializer, JsonSerializer, Serializer};
pub use storage::{StorageArea, StorageEvent, StorageEventSource, StorageKind};
pub use validator::{
    optional, required, with_default, AsyncStandardSchema, SchemaOutcome, SchemaValidator,
    StandardSchema, Validator, ValidatorAdapter,
};
