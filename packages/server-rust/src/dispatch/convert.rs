//! Conversion of header values into typed handler arguments.

use bytes::Bytes;
use packetmap_core::RouteKey;

use super::message::HeaderValue;

/// A header value could not be converted to the requested type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot convert {from} header to {to}")]
pub struct ConversionError {
    pub from: &'static str,
    pub to: &'static str,
}

impl ConversionError {
    fn new<T>(value: &HeaderValue) -> Self {
        Self {
            from: value.kind(),
            to: std::any::type_name::<T>(),
        }
    }
}

/// Types that can be produced from a single header value.
pub trait FromHeaderValue: Sized + Send + 'static {
    /// # Errors
    ///
    /// Returns [`ConversionError`] when the value has an incompatible shape.
    fn from_header_value(value: &HeaderValue) -> Result<Self, ConversionError>;
}

impl FromHeaderValue for HeaderValue {
    fn from_header_value(value: &HeaderValue) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl FromHeaderValue for String {
    fn from_header_value(value: &HeaderValue) -> Result<Self, ConversionError> {
        match value {
            HeaderValue::Str(s) => Ok(s.clone()),
            HeaderValue::Int(i) => Ok(i.to_string()),
            HeaderValue::Bool(b) => Ok(b.to_string()),
            HeaderValue::Route(r) => Ok(r.to_string()),
            HeaderValue::Bytes(b) => {
                String::from_utf8(b.to_vec()).map_err(|_| ConversionError::new::<Self>(value))
            }
            HeaderValue::Any(_) => Err(ConversionError::new::<Self>(value)),
        }
    }
}

impl FromHeaderValue for bool {
    fn from_header_value(value: &HeaderValue) -> Result<Self, ConversionError> {
        match value {
            HeaderValue::Bool(b) => Ok(*b),
            HeaderValue::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| ConversionError::new::<Self>(value)),
            _ => Err(ConversionError::new::<Self>(value)),
        }
    }
}

impl FromHeaderValue for Bytes {
    fn from_header_value(value: &HeaderValue) -> Result<Self, ConversionError> {
        match value {
            HeaderValue::Bytes(b) => Ok(b.clone()),
            HeaderValue::Str(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
            _ => Err(ConversionError::new::<Self>(value)),
        }
    }
}

impl FromHeaderValue for RouteKey {
    fn from_header_value(value: &HeaderValue) -> Result<Self, ConversionError> {
        match value {
            HeaderValue::Route(r) => Ok(*r),
            HeaderValue::Str(s) => s.parse().map_err(|_| ConversionError::new::<Self>(value)),
            _ => Err(ConversionError::new::<Self>(value)),
        }
    }
}

macro_rules! integer_from_header {
    ($($ty:ty),*) => {
        $(
            impl FromHeaderValue for $ty {
                fn from_header_value(value: &HeaderValue) -> Result<Self, ConversionError> {
                    match value {
                        HeaderValue::Int(i) => {
                            <$ty>::try_from(*i).map_err(|_| ConversionError::new::<Self>(value))
                        }
                        HeaderValue::Str(s) => s
                            .trim()
                            .parse()
                            .map_err(|_| ConversionError::new::<Self>(value)),
                        _ => Err(ConversionError::new::<Self>(value)),
                    }
                }
            }
        )*
    };
}

integer_from_header!(i8, i16, i32, i64, u8, u16, u32, u64, usize);
