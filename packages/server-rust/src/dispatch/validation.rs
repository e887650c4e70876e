//! Payload validation hooks.

use std::any::Any;
use std::marker::PhantomData;

use packetmap_core::{TypeKey, TypedValue};

/// Result of validating a resolved argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The value is acceptable.
    Valid,
    /// The value violates one or more constraints.
    Invalid {
        /// Human-readable descriptions of each failure.
        errors: Vec<String>,
    },
}

impl ValidationResult {
    #[must_use]
    pub fn invalid(error: impl Into<String>) -> Self {
        Self::Invalid {
            errors: vec![error.into()],
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Validates payload arguments of parameters marked `validated`.
pub trait Validator: Send + Sync {
    fn supports(&self, ty: &TypeKey) -> bool;

    fn validate(&self, value: &TypedValue) -> ValidationResult;
}

/// Adapts a closure over `&T` into a [`Validator`] for `T`.
pub struct FnValidator<T, F> {
    check: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> FnValidator<T, F>
where
    T: Any,
    F: Fn(&T) -> ValidationResult + Send + Sync,
{
    #[must_use]
    pub fn new(check: F) -> Self {
        Self {
            check,
            _marker: PhantomData,
        }
    }
}

impl<T, F> Validator for FnValidator<T, F>
where
    T: Any,
    F: Fn(&T) -> ValidationResult + Send + Sync,
{
    fn supports(&self, ty: &TypeKey) -> bool {
        ty.is::<T>()
    }

    fn validate(&self, value: &TypedValue) -> ValidationResult {
        match value.downcast_ref::<T>() {
            Some(value) => (self.check)(value),
            None => ValidationResult::invalid(format!(
                "expected {}, got {}",
                std::any::type_name::<T>(),
                value.type_key()
            )),
        }
    }
}
