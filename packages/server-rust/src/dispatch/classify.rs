//! Classification: turns raw transport packets into dispatchable messages.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use packetmap_core::{ContentKind, RouteKey};
use tokio_util::sync::CancellationToken;

use super::config::DispatcherConfig;
use super::error::ClassifyError;
use super::message::{
    CallContext, HeaderValue, InboundMessage, MessageHeaders, RawPacket, CONTENT_KIND_HEADER,
    DESTINATION_HEADER,
};
use super::response::{response_slot, ResponseReceiver};

/// Parses destinations, assigns call IDs and opens one response slot per
/// packet.
pub struct PacketClassifier {
    config: Arc<DispatcherConfig>,
    call_id_counter: AtomicU64,
}

impl PacketClassifier {
    #[must_use]
    pub fn new(config: Arc<DispatcherConfig>) -> Self {
        Self {
            config,
            call_id_counter: AtomicU64::new(1),
        }
    }

    fn next_call_id(&self) -> u64 {
        self.call_id_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Builds an [`InboundMessage`] and the receiver for its one outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError`] when the `destination` header is missing or
    /// does not parse as a route key.
    pub fn classify(
        &self,
        packet: RawPacket,
    ) -> Result<(InboundMessage, ResponseReceiver), ClassifyError> {
        let RawPacket {
            headers,
            payload,
            direction,
            cancellation,
        } = packet;

        let destination = parse_destination(&headers)?;
        let content_kind = content_kind(&headers, &self.config.default_content_kind);

        let call_id = self.next_call_id();
        let (slot, receiver) = response_slot(call_id);
        let call = CallContext {
            call_id,
            response: slot,
            cancellation: cancellation.unwrap_or_else(CancellationToken::new),
            timeout_ms: self.config.default_timeout_ms,
        };

        let message = InboundMessage::new(
            destination,
            direction,
            headers,
            content_kind,
            payload,
            call,
        );
        Ok((message, receiver))
    }
}

fn parse_destination(headers: &MessageHeaders) -> Result<RouteKey, ClassifyError> {
    match headers.get(DESTINATION_HEADER) {
        None => Err(ClassifyError::MissingDestination),
        Some(HeaderValue::Route(key)) => Ok(*key),
        Some(HeaderValue::Str(raw)) => raw
            .parse::<RouteKey>()
            .map_err(|e| ClassifyError::invalid(raw.as_str(), &e)),
        Some(other) => Err(ClassifyError::InvalidDestination {
            raw: format!("{other:?}"),
            reason: format!("expected a string or route header, got {}", other.kind()),
        }),
    }
}

fn content_kind(headers: &MessageHeaders, default: &ContentKind) -> ContentKind {
    headers
        .get(CONTENT_KIND_HEADER)
        .and_then(HeaderValue::as_str)
        .map_or_else(|| default.clone(), ContentKind::new)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
