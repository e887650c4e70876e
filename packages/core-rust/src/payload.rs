//! Immutable packet payloads exchanged between codecs and the dispatcher.

use bytes::{Bytes, BytesMut};

/// Binary body of a packet plus optional metadata.
///
/// Both regions are immutable once constructed. Constructors taking borrowed
/// input copy it, so a payload never aliases a buffer the caller can still
/// mutate. Cloning shares the underlying immutable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketPayload {
    data: Bytes,
    metadata: Option<Bytes>,
}

impl PacketPayload {
    /// Creates a payload from owned data and optional metadata.
    #[must_use]
    pub fn new(data: impl Into<Bytes>, metadata: Option<Bytes>) -> Self {
        Self {
            data: data.into(),
            metadata,
        }
    }

    /// UTF-8 encodes `text` as the payload body.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(text.into().into_bytes(), None)
    }

    /// UTF-8 encodes both the body and the metadata.
    #[must_use]
    pub fn from_text_with_metadata(text: impl Into<String>, metadata: Option<&str>) -> Self {
        Self::new(
            text.into().into_bytes(),
            metadata.map(|m| Bytes::copy_from_slice(m.as_bytes())),
        )
    }

    /// Copies `data` into a new payload.
    #[must_use]
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data), None)
    }

    /// Copies both regions into a new payload.
    #[must_use]
    pub fn from_slices(data: &[u8], metadata: Option<&[u8]>) -> Self {
        Self::new(
            Bytes::copy_from_slice(data),
            metadata.map(Bytes::copy_from_slice),
        )
    }

    /// Takes ownership of a write buffer, freezing it.
    #[must_use]
    pub fn from_buf(data: BytesMut, metadata: Option<BytesMut>) -> Self {
        Self::new(data.freeze(), metadata.map(BytesMut::freeze))
    }

    /// The payload body.
    #[must_use]
    pub fn data(&self) -> Bytes {
        self.data.clone()
    }

    /// The payload metadata, if any.
    #[must_use]
    pub fn metadata(&self) -> Option<Bytes> {
        self.metadata.clone()
    }

    /// Borrows the body without cloning.
    #[must_use]
    pub fn data_slice(&self) -> &[u8] {
        &self.data
    }

    /// Interprets the body as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns the UTF-8 error when the body is not valid text.
    pub fn data_utf8(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.data)
    }

    /// Whether the payload carries metadata.
    #[must_use]
    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    /// Splits the payload into its owned parts.
    #[must_use]
    pub fn into_parts(self) -> (Bytes, Option<Bytes>) {
        (self.data, self.metadata)
    }
}

impl From<Bytes> for PacketPayload {
    fn from(data: Bytes) -> Self {
        Self::new(data, None)
    }
}

impl From<Vec<u8>> for PacketPayload {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data, None)
    }
}

impl From<&str> for PacketPayload {
    fn from(text: &str) -> Self {
        Self::from_text(text)
    }
}

impl From<String> for PacketPayload {
    fn from(text: String) -> Self {
        Self::from_text(text)
    }
}
