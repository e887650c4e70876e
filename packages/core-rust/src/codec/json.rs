//! JSON codec for serde types.

use std::marker::PhantomData;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{collect_bytes, ByteStream, CodecError, ContentKind, Decoder, Encoder};
use crate::types::{TypeKey, TypedValue};

/// Encodes `T` as `application/json`.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> JsonCodec<T> {
    fn accepts(ty: &TypeKey, kind: &ContentKind) -> bool {
        ty.is::<T>() && kind.is_compatible_with(&ContentKind::JSON)
    }
}

impl<T> Encoder for JsonCodec<T>
where
    T: Serialize + Send + 'static,
{
    fn can_encode(&self, ty: &TypeKey, kind: &ContentKind) -> bool {
        Self::accepts(ty, kind)
    }

    fn encode(&self, value: TypedValue, _kind: &ContentKind) -> ByteStream {
        stream::once(async move {
            let ty = value.type_key();
            let value = value
                .downcast::<T>()
                .map_err(|_| CodecError::encode(&ty, "unexpected value type"))?;
            serde_json::to_vec(&value)
                .map(Bytes::from)
                .map_err(|e| CodecError::encode(&ty, e))
        })
        .boxed()
    }
}

#[async_trait]
impl<T> Decoder for JsonCodec<T>
where
    T: DeserializeOwned + Send + 'static,
{
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
        let value: T = serde_json::from_slice(&body).map_err(|e| CodecError::decode(ty, e))?;
        Ok(Some(TypedValue::new(value)))
    }
}
