//! Pass-through codec for raw binary bodies.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use futures_util::StreamExt;

use super::{collect_bytes, ByteStream, CodecError, ContentKind, Decoder, Encoder};
use crate::payload::PacketPayload;
use crate::types::{TypeKey, TypedValue};

/// Moves `Bytes`, `Vec<u8>` and `PacketPayload` values through unchanged.
///
/// Decoding a `PacketPayload` keeps only the body; metadata travels out of
/// band.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl BytesCodec {
    fn accepts(ty: &TypeKey, kind: &ContentKind) -> bool {
        (ty.is::<Bytes>() || ty.is::<Vec<u8>>() || ty.is::<PacketPayload>())
            && kind.is_compatible_with(&ContentKind::OCTET_STREAM)
    }
}

fn into_bytes(value: TypedValue) -> Result<Bytes, CodecError> {
    let ty = value.type_key();
    let value = match value.downcast::<Bytes>() {
        Ok(bytes) => return Ok(bytes),
        Err(value) => value,
    };
    let value = match value.downcast::<Vec<u8>>() {
        Ok(vec) => return Ok(Bytes::from(vec)),
        Err(value) => value,
    };
    value
        .downcast::<PacketPayload>()
        .map(|payload| payload.data())
        .map_err(|_| CodecError::encode(&ty, "value is not a binary type"))
}

impl Encoder for BytesCodec {
    fn can_encode(&self, ty: &TypeKey, kind: &ContentKind) -> bool {
        Self::accepts(ty, kind)
    }

    fn encode(&self, value: TypedValue, _kind: &ContentKind) -> ByteStream {
        stream::once(async move { into_bytes(value) }).boxed()
    }
}

#[async_trait]
impl Decoder for BytesCodec {
    fn can_decode(&self, ty: &TypeKey, kind: &ContentKind) -> bool {
        Self::accepts(ty, kind)
    }

    async fn decode(
        &self,
        input: ByteStream,
        ty: &TypeKey,
        _kind: &ContentKind,
    ) -> Result<Option<TypedValue>, CodecError> {
        let Some(body) = collect_bytes(input).await? else {
            return Ok(None);
        };
        let value = if ty.is::<Vec<u8>>() {
            TypedValue::new(body.to_vec())
        } else if ty.is::<PacketPayload>() {
            TypedValue::new(PacketPayload::from(body))
        } else {
            TypedValue::new(body)
        };
        Ok(Some(value))
    }
}
