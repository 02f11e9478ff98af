//! Validator adapter
//!
//! Every value read from a persistence medium passes through a validator
//! before it reaches a caller. Two shapes are accepted:
//!
//! - **Plain functions**: any `Fn(Option<&Value>) -> Result<T, ValidationError>`
//! - **Schema objects**: types implementing [`StandardSchema`] (or
//!   [`AsyncStandardSchema`]), whose issue lists are wrapped into a
//!   [`ValidationError`] carrying the original input
//!
//! [`ValidatorAdapter`] is the tagged union over these shapes and gives both a
//! synchronous and an asynchronous call contract.
//!
//! `None` input means the value is absent. Validators are responsible for
//! supplying defaults for absent or invalid values.

use crate::error::{Issue, ValidationError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Turns an untrusted raw value into a trusted typed value
pub trait Validator<T>: Send + Sync {
    /// Validate a raw value (`None` = absent)
    fn validate(&self, raw: Option<&Value>) -> Result<T, ValidationError>;
}

impl<T, F> Validator<T> for F
where
    F: Fn(Option<&Value>) -> Result<T, ValidationError> + Send + Sync,
{
    fn validate(&self, raw: Option<&Value>) -> Result<T, ValidationError> {
        self(raw)
    }
}

/// Result of a schema-style validation
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaOutcome<T> {
    Success(T),
    Issues(Vec<Issue>),
}

/// Schema object exposing a standard validation entry point
pub trait StandardSchema<T>: Send + Sync {
    fn validate(&self, raw: Option<&Value>) -> SchemaOutcome<T>;
}

/// Schema object whose validation completes asynchronously
#[async_trait]
pub trait AsyncStandardSchema<T: Send>: Send + Sync {
    async fn validate(&self, raw: Option<&Value>) -> SchemaOutcome<T>;
}

fn into_result<T>(outcome: SchemaOutcome<T>, raw: Option<&Value>) -> Result<T, ValidationError> {
    match outcome {
        SchemaOutcome::Success(value) => Ok(value),
        SchemaOutcome::Issues(issues) => Err(ValidationError::new(issues, raw.cloned())),
    }
}

/// Adapts a [`StandardSchema`] to the [`Validator`] contract
pub struct SchemaValidator<S> {
    schema: S,
}

impl<S> SchemaValidator<S> {
    pub fn new(schema: S) -> Self {
        Self { schema }
    }
}

impl<T, S> Validator<T> for SchemaValidator<S>
where
    S: StandardSchema<T>,
{
    fn validate(&self, raw: Option<&Value>) -> Result<T, ValidationError> {
        into_result(self.schema.validate(raw), raw)
    }
}

type ValidatorFn<T> = dyn Fn(Option<&Value>) -> Result<T, ValidationError> + Send + Sync;

/// Tagged union over the accepted validator shapes
pub enum ValidatorAdapter<T> {
    Function(Arc<ValidatorFn<T>>),
    Schema(Arc<dyn StandardSchema<T>>),
    AsyncSchema(Arc<dyn AsyncStandardSchema<T>>),
}

impl<T> Clone for ValidatorAdapter<T> {
    fn clone(&self) -> Self {
        match self {
            ValidatorAdapter::Function(f) => ValidatorAdapter::Function(Arc::clone(f)),
            ValidatorAdapter::Schema(s) => ValidatorAdapter::Schema(Arc::clone(s)),
            ValidatorAdapter::AsyncSchema(s) => ValidatorAdapter::AsyncSchema(Arc::clone(s)),
        }
    }
}

impl<T> std::fmt::Debug for ValidatorAdapter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ValidatorAdapter::Function(_) => "Function",
            ValidatorAdapter::Schema(_) => "Schema",
            ValidatorAdapter::AsyncSchema(_) => "AsyncSchema",
        };
        f.debug_tuple("ValidatorAdapter").field(&kind).finish()
    }
}

impl<T: Send + 'static> ValidatorAdapter<T> {
    pub fn from_fn(
        f: impl Fn(Option<&Value>) -> Result<T, ValidationError> + Send + Sync + 'static,
    ) -> Self {
        ValidatorAdapter::Function(Arc::new(f))
    }

    pub fn from_schema(schema: impl StandardSchema<T> + 'static) -> Self {
        ValidatorAdapter::Schema(Arc::new(schema))
    }

    pub fn from_async_schema(schema: impl AsyncStandardSchema<T> + 'static) -> Self {
        ValidatorAdapter::AsyncSchema(Arc::new(schema))
    }

    /// Whether this validator can only run through [`validate_async`](Self::validate_async)
    pub fn is_async(&self) -> bool {
        matches!(self, ValidatorAdapter::AsyncSchema(_))
    }

    /// Validate through the asynchronous contract (works for every shape)
    pub async fn validate_async(&self, raw: Option<&Value>) -> Result<T, ValidationError> {
        match self {
            ValidatorAdapter::Function(f) => f(raw),
            ValidatorAdapter::Schema(s) => into_result(s.validate(raw), raw),
            ValidatorAdapter::AsyncSchema(s) => into_result(s.validate(raw).await, raw),
        }
    }
}

impl<T: Send + 'static> Validator<T> for ValidatorAdapter<T> {
    fn validate(&self, raw: Option<&Value>) -> Result<T, ValidationError> {
        match self {
            ValidatorAdapter::Function(f) => f(raw),
            ValidatorAdapter::Schema(s) => into_result(s.validate(raw), raw),
            ValidatorAdapter::AsyncSchema(_) => Err(ValidationError::message(
                "Schema validation must be synchronous",
                raw,
            )),
        }
    }
}

fn deserialize<T: DeserializeOwned>(raw: &Value) -> Result<T, ValidationError> {
    T::deserialize(raw).map_err(|e| ValidationError::message(e.to_string(), Some(raw)))
}

/// Deserializes into `T`, falling back to a default on absent or invalid input
#[derive(Debug, Clone)]
pub struct WithDefault<T> {
    default: T,
}

/// Validator that never fails: absent or invalid input yields `default`
pub fn with_default<T>(default: T) -> WithDefault<T>
where
    T: DeserializeOwned + Clone + Send + Sync,
{
    WithDefault { default }
}

impl<T> Validator<T> for WithDefault<T>
where
    T: DeserializeOwned + Clone + Send + Sync,
{
    fn validate(&self, raw: Option<&Value>) -> Result<T, ValidationError> {
        Ok(raw
            .and_then(|value| deserialize(value).ok())
            .unwrap_or_else(|| self.default.clone()))
    }
}

/// Deserializes into `T`; absent or invalid input is an error
#[derive(Debug)]
pub struct Required<T> {
    _type: PhantomData<fn() -> T>,
}

pub fn required<T: DeserializeOwned>() -> Required<T> {
    Required { _type: PhantomData }
}

impl<T: DeserializeOwned> Validator<T> for Required<T> {
    fn validate(&self, raw: Option<&Value>) -> Result<T, ValidationError> {
        match raw {
            Some(value) => deserialize(value),
            None => Err(ValidationError::message("Required", None)),
        }
    }
}

/// Deserializes into `Option<T>`; absent input is `None`, invalid input is an error
#[derive(Debug)]
pub struct Optional<T> {
    _type: PhantomData<fn() -> T>,
}

pub fn optional<T: DeserializeOwned>() -> Optional<T> {
    Optional { _type: PhantomData }
}

impl<T: DeserializeOwned> Validator<Option<T>> for Optional<T> {
    fn validate(&self, raw: Option<&Value>) -> Result<Option<T>, ValidationError> {
        raw.map(deserialize).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PathSegment;
    use serde_json::json;

    struct EvenNumber;

    impl StandardSchema<i64> for EvenNumber {
        fn validate(&self, raw: Option<&Value>) -> SchemaOutcome<i64> {
            match raw.and_then(Value::as_i64) {
                Some(n) if n % 2 == 0 => SchemaOutcome::Success(n),
                Some(_) => SchemaOutcome::Issues(vec![Issue::new("not even")]),
                None => SchemaOutcome::Issues(vec![Issue::at(
                    vec![PathSegment::Key("value".into())],
                    "expected integer",
                )]),
            }
        }
    }

    struct SlowEven;

    #[async_trait]
    impl AsyncStandardSchema<i64> for SlowEven {
        async fn validate(&self, raw: Option<&Value>) -> SchemaOutcome<i64> {
            tokio::task::yield_now().await;
            EvenNumber.validate(raw)
        }
    }

    #[test]
    fn test_plain_function_validator() {
        let v = |raw: Option<&Value>| -> Result<String, ValidationError> {
            Ok(raw.and_then(Value::as_str).unwrap_or("").to_string())
        };
        assert_eq!(v.validate(Some(&json!("hi"))).unwrap(), "hi");
        assert_eq!(v.validate(None).unwrap(), "");
    }

    #[test]
    fn test_schema_validator_wraps_issues_with_input() {
        let v = SchemaValidator::new(EvenNumber);
        assert_eq!(v.validate(Some(&json!(4))).unwrap(), 4);

        let err = v.validate(Some(&json!(3))).unwrap_err();
        assert_eq!(err.issues, vec![Issue::new("not even")]);
        assert_eq!(err.input, Some(json!(3)));
    }

    #[test]
    fn test_adapter_dispatch() {
        let f = ValidatorAdapter::from_fn(|raw: Option<&Value>| {
            Ok(raw.and_then(Value::as_i64).unwrap_or(0))
        });
        let s = ValidatorAdapter::from_schema(EvenNumber);
        assert!(!f.is_async());
        assert_eq!(f.validate(None).unwrap(), 0);
        assert!(s.validate(Some(&json!(5))).is_err());
    }

    #[test]
    fn test_async_schema_rejected_in_sync_context() {
        let v = ValidatorAdapter::from_async_schema(SlowEven);
        assert!(v.is_async());
        let err = v.validate(Some(&json!(2))).unwrap_err();
        assert_eq!(err.issues[0].message, "Schema validation must be synchronous");
    }

    #[tokio::test]
    async fn test_async_contract_runs_every_shape() {
        let sync = ValidatorAdapter::from_schema(EvenNumber);
        let slow = ValidatorAdapter::from_async_schema(SlowEven);
        assert_eq!(sync.validate_async(Some(&json!(8))).await.unwrap(), 8);
        assert_eq!(slow.validate_async(Some(&json!(6))).await.unwrap(), 6);
        assert!(slow.validate_async(Some(&json!(7))).await.is_err());
    }

    #[test]
    fn test_with_default_falls_back() {
        let v = with_default(10u32);
        assert_eq!(v.validate(None).unwrap(), 10);
        assert_eq!(v.validate(Some(&json!("nope"))).unwrap(), 10);
        assert_eq!(v.validate(Some(&json!(3))).unwrap(), 3);
    }

    #[test]
    fn test_required_and_optional() {
        let r = required::<bool>();
        assert!(r.validate(None).is_err());
        assert!(r.validate(Some(&json!(true))).unwrap());

        let o = optional::<String>();
        assert_eq!(o.validate(None).unwrap(), None);
        assert_eq!(o.validate(Some(&json!("x"))).unwrap(), Some("x".to_string()));
        assert!(o.validate(Some(&json!(1))).is_err());
    }
}
