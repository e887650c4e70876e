//! UTF-8 text codec.

use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;

use super::{collect_bytes, ByteStream, CodecError, ContentKind, Decoder, Encoder};
use crate::types::{TypeKey, TypedValue};

/// Encodes and decodes `String` values as UTF-8 `text/plain`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl StringCodec {
    fn accepts(ty: &TypeKey, kind: &ContentKind) -> bool {
        ty.is::<String>() && kind.is_compatible_with(&ContentKind::TEXT_PLAIN)
    }
}

impl Encoder for StringCodec {
    fn can_encode(&self, ty: &TypeKey, kind: &ContentKind) -> bool {
        Self::accepts(ty, kind)
    }

    fn encode(&self, value: TypedValue, _kind: &ContentKind) -> ByteStream {
        stream::once(async move {
            let ty = value.type_key();
            value
                .downcast::<String>()
                .map(bytes::Bytes::from)
                .map_err(|_| CodecError::encode(&ty, "value is not a String"))
        })
        .boxed()
    }
}

#[async_trait]
impl Decoder for StringCodec {
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
        let text = String::from_utf8(body.to_vec()).map_err(|e| CodecError::decode(ty, e))?;
        Ok(Some(TypedValue::new(text)))
    }
}
