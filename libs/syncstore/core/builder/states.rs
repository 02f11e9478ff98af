//! Type-state markers for the store builder
//!
//! A store needs a key and a validator. The builder carries them in its type
//! parameters, so `build` only exists once both were given.

use crate::traits::Validator;
use std::sync::Arc;

/// Marker trait for key state
pub trait KeyState {}

/// Key has not been set
pub struct NoKey;
impl KeyState for NoKey {}

/// Key has been set
pub struct HasKey(pub(crate) String);
impl KeyState for HasKey {}

/// Marker trait for validator state
pub trait ValidatorState {}

/// Validator has not been set
pub struct NoValidator;
impl ValidatorState for NoValidator {}

/// Validator has been set
pub struct HasValidator<T>(pub(crate) Arc<dyn Validator<T>>);
impl<T> ValidatorState for HasValidator<T> {}
