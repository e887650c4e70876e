//! Runtime type identity and type-erased values.
//!
//! Handler parameters and return values cross the dispatcher as
//! [`TypedValue`]s. Codec and outbound-target selection key off the value's
//! runtime [`TypeKey`], never off a statically declared type, because one
//! handler may produce different concrete types on different calls.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a Rust type, with its name kept for diagnostics.
///
/// Equality and hashing use only the `TypeId`.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// The key for `T`.
    #[must_use]
    pub fn of<T: Any + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Whether this key identifies `T`.
    #[must_use]
    pub fn is<T: Any + ?Sized>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    /// The underlying `TypeId`.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The type's name as reported by `std::any::type_name`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// An owned value whose concrete type is only known at runtime.
pub struct TypedValue {
    value: Box<dyn Any + Send>,
    type_key: TypeKey,
}

impl TypedValue {
    /// Wraps `value`, recording its concrete type.
    #[must_use]
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_key: TypeKey::of::<T>(),
        }
    }

    /// The runtime type of the wrapped value.
    #[must_use]
    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    /// Whether the wrapped value is a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.type_key.is::<T>()
    }

    /// Borrows the value as `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Recovers the value as `T`, handing `self` back on a type mismatch.
    ///
    /// # Errors
    ///
    /// Returns the original value when it is not a `T`.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let type_key = self.type_key;
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self { value, type_key }),
        }
    }
}

impl fmt::Debug for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedValue")
            .field("type", &self.type_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_keys_compare_by_type_id() {
        assert_eq!(TypeKey::of::<String>(), TypeKey::of::<String>());
        assert_ne!(TypeKey::of::<String>(), TypeKey::of::<&'static str>());
        assert!(TypeKey::of::<u32>().is::<u32>());
        assert!(TypeKey::of::<String>().name().ends_with("String"));
    }

    #[test]
    fn typed_value_downcasts() {
        let value = TypedValue::new(String::from("hello"));
        assert!(value.is::<String>());
        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("hello"));
        assert_eq!(value.downcast::<String>().unwrap(), "hello");
    }

    #[test]
    fn failed_downcast_returns_original() {
        let value = TypedValue::new(7_u32);
        let value = value.downcast::<String>().unwrap_err();
        assert_eq!(value.type_key(), TypeKey::of::<u32>());
        assert_eq!(value.downcast::<u32>().unwrap(), 7);
    }
}
