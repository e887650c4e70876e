//! Ordered encoder/decoder lists with first-match selection.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use super::{CodecError, ContentKind, Decoder, Encoder};
use crate::types::TypeKey;

struct Inner {
    encoders: Vec<Arc<dyn Encoder>>,
    decoders: Vec<Arc<dyn Decoder>>,
}

/// Immutable, cheaply cloneable codec lists.
///
/// Selection walks the configured order on every call and returns the first
/// codec that accepts the `(type, kind)` pair. Results are never cached, so
/// two calls with the same inputs always pick the same codec.
#[derive(Clone)]
pub struct CodecRegistry {
    inner: Arc<Inner>,
}

impl CodecRegistry {
    #[must_use]
    pub fn builder() -> CodecRegistryBuilder {
        CodecRegistryBuilder::default()
    }

    /// A registry holding the stock text and raw-bytes codecs.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::builder()
            .codec(super::StringCodec)
            .codec(super::BytesCodec)
            .build()
    }

    /// # Errors
    ///
    /// Returns [`CodecError::NoEncoder`] when no encoder accepts the pair.
    pub fn encoder_for(
        &self,
        ty: &TypeKey,
        kind: &ContentKind,
    ) -> Result<Arc<dyn Encoder>, CodecError> {
        self.inner
            .encoders
            .iter()
            .find(|e| e.can_encode(ty, kind))
            .cloned()
            .ok_or_else(|| {
                trace!(type_name = ty.name(), %kind, "no encoder accepts value");
                CodecError::NoEncoder {
                    type_name: ty.name().to_string(),
                    kind: kind.clone(),
                }
            })
    }

    /// # Errors
    ///
    /// Returns [`CodecError::NoDecoder`] when no decoder accepts the pair.
    pub fn decoder_for(
        &self,
        ty: &TypeKey,
        kind: &ContentKind,
    ) -> Result<Arc<dyn Decoder>, CodecError> {
        self.inner
            .decoders
            .iter()
            .find(|d| d.can_decode(ty, kind))
            .cloned()
            .ok_or_else(|| {
                trace!(type_name = ty.name(), %kind, "no decoder accepts payload");
                CodecError::NoDecoder {
                    type_name: ty.name().to_string(),
                    kind: kind.clone(),
                }
            })
    }

    #[must_use]
    pub fn encoder_count(&self) -> usize {
        self.inner.encoders.len()
    }

    #[must_use]
    pub fn decoder_count(&self) -> usize {
        self.inner.decoders.len()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("encoders", &self.encoder_count())
            .field("decoders", &self.decoder_count())
            .finish()
    }
}

/// Collects codecs in priority order.
#[derive(Default)]
pub struct CodecRegistryBuilder {
    encoders: Vec<Arc<dyn Encoder>>,
    decoders: Vec<Arc<dyn Decoder>>,
}

impl CodecRegistryBuilder {
    #[must_use]
    pub fn encoder(mut self, encoder: impl Encoder + 'static) -> Self {
        self.encoders.push(Arc::new(encoder));
        self
    }

    #[must_use]
    pub fn decoder(mut self, decoder: impl Decoder + 'static) -> Self {
        self.decoders.push(Arc::new(decoder));
        self
    }

    /// Registers one value as both encoder and decoder.
    #[must_use]
    pub fn codec<C>(mut self, codec: C) -> Self
    where
        C: Encoder + Decoder + 'static,
    {
        let codec = Arc::new(codec);
        self.encoders.push(codec.clone());
        self.decoders.push(codec);
        self
    }

    #[must_use]
    pub fn build(self) -> CodecRegistry {
        CodecRegistry {
            inner: Arc::new(Inner {
                encoders: self.encoders,
                decoders: self.decoders,
            }),
        }
    }
}
