//! Codec strategies: pluggable encoders and decoders keyed by runtime type and
//! content kind.
//!
//! The dispatcher never names a concrete codec. It asks a [`CodecRegistry`]
//! for the first [`Encoder`] or [`Decoder`] that accepts a `(TypeKey,
//! ContentKind)` pair. Stock codecs for text, raw bytes, `MsgPack` and JSON
//! are provided for convenience.

mod json;
mod msgpack;
mod raw;
mod registry;
mod text;

use std::borrow::Cow;
use std::fmt;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::types::{TypeKey, TypedValue};

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
pub use raw::BytesCodec;
pub use registry::{CodecRegistry, CodecRegistryBuilder};
pub use text::StringCodec;

/// Lazily produced chunks of an encoded body.
pub type ByteStream = BoxStream<'static, Result<Bytes, CodecError>>;

// ---------------------------------------------------------------------------
// ContentKind
// ---------------------------------------------------------------------------

/// A `type/subtype` content descriptor. Either half may be `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentKind(Cow<'static, str>);

impl ContentKind {
    pub const ANY: Self = Self::from_static("*/*");
    pub const TEXT_PLAIN: Self = Self::from_static("text/plain");
    pub const OCTET_STREAM: Self = Self::from_static("application/octet-stream");
    pub const MSGPACK: Self = Self::from_static("application/x-msgpack");
    pub const JSON: Self = Self::from_static("application/json");

    #[must_use]
    pub const fn from_static(kind: &'static str) -> Self {
        Self(Cow::Borrowed(kind))
    }

    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self(Cow::Owned(kind.into().trim().to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn parts(&self) -> (&str, &str) {
        self.0.split_once('/').unwrap_or((self.as_str(), "*"))
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        let (ty, sub) = self.parts();
        ty == "*" || sub == "*"
    }

    /// Whether every kind matched by `other` is also matched by `self`.
    #[must_use]
    pub fn includes(&self, other: &Self) -> bool {
        let (ty, sub) = self.parts();
        let (other_ty, other_sub) = other.parts();
        if ty == "*" {
            return true;
        }
        ty == other_ty && (sub == "*" || sub == other_sub)
    }

    /// Symmetric form of [`includes`](Self::includes).
    #[must_use]
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.includes(other) || other.includes(self)
    }
}

impl Default for ContentKind {
    fn default() -> Self {
        Self::ANY
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentKind {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Codec selection and transcoding failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("No encoder for {type_name}, content kind {kind}")]
    NoEncoder { type_name: String, kind: ContentKind },
    #[error("No decoder for {type_name}, content kind {kind}")]
    NoDecoder { type_name: String, kind: ContentKind },
    #[error("failed to encode {type_name}: {reason}")]
    Encode { type_name: String, reason: String },
    #[error("failed to decode {type_name}: {reason}")]
    Decode { type_name: String, reason: String },
}

impl CodecError {
    pub(crate) fn encode(ty: &TypeKey, reason: impl fmt::Display) -> Self {
        Self::Encode {
            type_name: ty.name().to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn decode(ty: &TypeKey, reason: impl fmt::Display) -> Self {
        Self::Decode {
            type_name: ty.name().to_string(),
            reason: reason.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy traits
// ---------------------------------------------------------------------------

/// Turns a typed value into a lazy stream of bytes.
pub trait Encoder: Send + Sync {
    /// Whether this encoder handles values of `ty` for the requested `kind`.
    fn can_encode(&self, ty: &TypeKey, kind: &ContentKind) -> bool;

    /// Encodes `value`. Nothing is produced until the stream is polled.
    fn encode(&self, value: TypedValue, kind: &ContentKind) -> ByteStream;
}

/// Turns a stream of bytes back into a typed value.
#[async_trait]
pub trait Decoder: Send + Sync {
    fn can_decode(&self, ty: &TypeKey, kind: &ContentKind) -> bool;

    /// Decodes a body into a value of `ty`. An empty body yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] when the body is malformed.
    async fn decode(
        &self,
        input: ByteStream,
        ty: &TypeKey,
        kind: &ContentKind,
    ) -> Result<Option<TypedValue>, CodecError>;
}

/// Concatenates a byte stream. Returns `None` when no bytes arrived.
///
/// # Errors
///
/// Propagates the first error yielded by the stream.
pub async fn collect_bytes(mut input: ByteStream) -> Result<Option<Bytes>, CodecError> {
    let mut chunks: Vec<Bytes> = Vec::new();
    while let Some(chunk) = input.next().await {
        let chunk = chunk?;
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
    }
    if chunks.len() <= 1 {
        return Ok(chunks.pop());
    }
    let mut buf = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
    for chunk in &chunks {
        buf.extend_from_slice(chunk);
    }
    Ok(Some(buf.freeze()))
}

/// Wraps a single buffer as a one-chunk stream.
#[must_use]
pub fn once_bytes(bytes: Bytes) -> ByteStream {
    futures_util::stream::once(async move { Ok(bytes) }).boxed()
}

/// A stream that fails on first poll.
#[must_use]
pub fn failed_stream(error: CodecError) -> ByteStream {
    futures_util::stream::once(async move { Err(error) }).boxed()
}
