//! Message model: headers, inbound messages and their per-call context.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use packetmap_core::codec::{self, ByteStream};
use packetmap_core::{ContentKind, DestinationVars, Direction, PacketPayload, RouteKey};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::response::ResponseSlot;

/// Header carrying the `"group.cmd"` destination of an inbound packet.
pub const DESTINATION_HEADER: &str = "destination";
/// Header selecting the content kind used to decode the payload.
pub const CONTENT_KIND_HEADER: &str = "contentKind";
/// Header carrying the connection's [`PacketRequester`](super::requester::PacketRequester).
pub const PACKET_REQUESTER_HEADER: &str = "packetRequester";
/// Outbound attribute holding the resolved reply group.
pub const TARGET_GROUP_HEADER: &str = "target.group";
/// Outbound attribute holding the resolved reply cmd.
pub const TARGET_CMD_HEADER: &str = "target.cmd";

// ---------------------------------------------------------------------------
// HeaderValue
// ---------------------------------------------------------------------------

/// A single header value.
#[derive(Clone)]
pub enum HeaderValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Bytes(Bytes),
    Route(RouteKey),
    /// Opaque application object, e.g. a requester handle.
    Any(Arc<dyn Any + Send + Sync>),
}

impl HeaderValue {
    /// Wraps an arbitrary shared object.
    #[must_use]
    pub fn any<T: Any + Send + Sync>(value: T) -> Self {
        Self::Any(Arc::new(value))
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrows an opaque object as `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Any(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Short type label for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
            Self::Route(_) => "route",
            Self::Any(_) => "object",
        }
    }
}

impl PartialEq for HeaderValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Route(a), Self::Route(b)) => a == b,
            (Self::Any(a), Self::Any(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Bytes(b) => write!(f, "{b:?}"),
            Self::Route(r) => write!(f, "{r}"),
            Self::Any(_) => f.write_str("<object>"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Bytes> for HeaderValue {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<RouteKey> for HeaderValue {
    fn from(value: RouteKey) -> Self {
        Self::Route(value)
    }
}

// ---------------------------------------------------------------------------
// MessageHeaders
// ---------------------------------------------------------------------------

/// Read-only header map. Cloning shares the underlying map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageHeaders {
    entries: Arc<HashMap<String, HeaderValue>>,
}

impl MessageHeaders {
    #[must_use]
    pub fn builder() -> MessageHeadersBuilder {
        MessageHeadersBuilder::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copies the headers into a builder for extension.
    #[must_use]
    pub fn to_builder(&self) -> MessageHeadersBuilder {
        MessageHeadersBuilder {
            entries: (*self.entries).clone(),
        }
    }
}

/// Accumulates headers before freezing them into [`MessageHeaders`].
#[derive(Debug, Default)]
pub struct MessageHeadersBuilder {
    entries: HashMap<String, HeaderValue>,
}

impl MessageHeadersBuilder {
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.entries.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn build(self) -> MessageHeaders {
        MessageHeaders {
            entries: Arc::new(self.entries),
        }
    }
}

impl<K: Into<String>, V: Into<HeaderValue>> FromIterator<(K, V)> for MessageHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::builder(), |b, (k, v)| b.header(k, v))
            .build()
    }
}

// ---------------------------------------------------------------------------
// CallContext
// ---------------------------------------------------------------------------

/// Per-message call state created by the classifier.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub call_id: u64,
    pub response: ResponseSlot,
    pub cancellation: CancellationToken,
    pub timeout_ms: u64,
}

// ---------------------------------------------------------------------------
// RawPacket
// ---------------------------------------------------------------------------

/// What the transport hands over for classification.
pub struct RawPacket {
    pub headers: MessageHeaders,
    pub payload: ByteStream,
    pub direction: Direction,
    /// Usually a child of the connection's token.
    pub cancellation: Option<CancellationToken>,
}

impl RawPacket {
    #[must_use]
    pub fn new(headers: MessageHeaders, payload: ByteStream) -> Self {
        Self {
            headers,
            payload,
            direction: Direction::Inbound,
            cancellation: None,
        }
    }

    /// An inbound packet addressed to `destination` carrying `payload`.
    #[must_use]
    pub fn to_destination(destination: RouteKey, payload: &PacketPayload) -> Self {
        let headers = MessageHeaders::builder()
            .header(DESTINATION_HEADER, destination)
            .build();
        Self::new(headers, codec::once_bytes(payload.data()))
    }

    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Extends the headers with one more entry.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers = self.headers.to_builder().header(name, value).build();
        self
    }
}

impl fmt::Debug for RawPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawPacket")
            .field("headers", &self.headers)
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// InboundMessage
// ---------------------------------------------------------------------------

/// A classified message ready for dispatch.
///
/// The payload stream can be taken once; later resolvers asking for it get
/// `None`.
pub struct InboundMessage {
    destination: RouteKey,
    direction: Direction,
    headers: MessageHeaders,
    content_kind: ContentKind,
    payload: Mutex<Option<ByteStream>>,
    destination_vars: DestinationVars,
    call: CallContext,
}

impl InboundMessage {
    #[must_use]
    pub fn new(
        destination: RouteKey,
        direction: Direction,
        headers: MessageHeaders,
        content_kind: ContentKind,
        payload: ByteStream,
        call: CallContext,
    ) -> Self {
        Self {
            destination,
            direction,
            headers,
            content_kind,
            payload: Mutex::new(Some(payload)),
            destination_vars: DestinationVars::new(),
            call,
        }
    }

    #[must_use]
    pub fn destination(&self) -> RouteKey {
        self.destination
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn headers(&self) -> &MessageHeaders {
        &self.headers
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    #[must_use]
    pub fn content_kind(&self) -> &ContentKind {
        &self.content_kind
    }

    #[must_use]
    pub fn call(&self) -> &CallContext {
        &self.call
    }

    #[must_use]
    pub fn call_id(&self) -> u64 {
        self.call.call_id
    }

    #[must_use]
    pub fn response(&self) -> &ResponseSlot {
        &self.call.response
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.call.cancellation
    }

    #[must_use]
    pub fn destination_vars(&self) -> &DestinationVars {
        &self.destination_vars
    }

    /// Records the variables captured by the matched route.
    pub fn set_destination_vars(&mut self, vars: DestinationVars) {
        self.destination_vars = vars;
    }

    /// Takes the payload stream. Only the first call returns it.
    #[must_use]
    pub fn take_payload(&self) -> Option<ByteStream> {
        self.payload.lock().take()
    }

    /// Takes the payload stream, or an empty stream if it was already taken.
    #[must_use]
    pub fn take_payload_or_empty(&self) -> ByteStream {
        self.take_payload()
            .unwrap_or_else(|| futures_util::stream::empty().boxed())
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("destination", &self.destination)
            .field("direction", &self.direction)
            .field("call_id", &self.call.call_id)
            .field("content_kind", &self.content_kind)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
