//! Single-assignment response slots correlating one inbound message with its
//! one terminal outcome.

use std::fmt;
use std::sync::Arc;

use futures_util::stream::BoxStream;
use futures_util::TryStreamExt;
use packetmap_core::{OutboundTarget, PacketPayload, RouteKey};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error};

use super::error::{DispatchError, SlotError};
use super::message::{HeaderValue, MessageHeaders, TARGET_CMD_HEADER, TARGET_GROUP_HEADER};

// ---------------------------------------------------------------------------
// OutboundPacket
// ---------------------------------------------------------------------------

/// One encoded reply chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    /// Explicit reply address. `None` means "reply on the request's key".
    pub target: Option<OutboundTarget>,
    pub payload: PacketPayload,
}

impl OutboundPacket {
    #[must_use]
    pub fn new(target: Option<OutboundTarget>, payload: PacketPayload) -> Self {
        Self { target, payload }
    }

    /// The key this packet should be sent on, given the request's key.
    #[must_use]
    pub fn reply_key(&self, request: RouteKey) -> RouteKey {
        self.target
            .map_or(request, |target| RouteKey::new(target.group, target.cmd))
    }

    /// Outbound addressing as `target.group` / `target.cmd` attributes.
    /// Empty when no target was resolved.
    #[must_use]
    pub fn to_headers(&self) -> MessageHeaders {
        let mut builder = MessageHeaders::builder();
        if let Some(target) = self.target {
            builder = builder
                .header(TARGET_GROUP_HEADER, HeaderValue::Int(i64::from(target.group)))
                .header(TARGET_CMD_HEADER, HeaderValue::Int(i64::from(target.cmd)));
        }
        builder.build()
    }
}

// ---------------------------------------------------------------------------
// ResponseOutcome
// ---------------------------------------------------------------------------

/// Lazily produced reply packets.
pub type ResponseStream = BoxStream<'static, Result<OutboundPacket, DispatchError>>;

/// The terminal result written into a response slot.
pub enum ResponseOutcome {
    /// Zero or more reply packets, produced as the transport polls.
    Content(ResponseStream),
    /// The handler returned nothing.
    NoContent,
    /// Dispatch failed before any content was produced.
    Failed(DispatchError),
}

impl ResponseOutcome {
    /// Drains the outcome into its packets.
    ///
    /// # Errors
    ///
    /// Returns the dispatch failure, or the first error in the content stream.
    pub async fn into_packets(self) -> Result<Vec<OutboundPacket>, DispatchError> {
        match self {
            Self::Content(stream) => stream.try_collect().await,
            Self::NoContent => Ok(Vec::new()),
            Self::Failed(err) => Err(err),
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Debug for ResponseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content(_) => f.write_str("Content(..)"),
            Self::NoContent => f.write_str("NoContent"),
            Self::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// ResponseSlot / ResponseReceiver
// ---------------------------------------------------------------------------

struct SlotInner {
    call_id: u64,
    sender: Mutex<Option<oneshot::Sender<ResponseOutcome>>>,
}

/// Write half of a response slot. Cloneable; all clones share one slot.
#[derive(Clone)]
pub struct ResponseSlot {
    inner: Arc<SlotInner>,
}

/// Read half of a response slot, owned by the transport.
pub struct ResponseReceiver {
    call_id: u64,
    rx: oneshot::Receiver<ResponseOutcome>,
}

/// Creates a connected slot and receiver for `call_id`.
#[must_use]
pub fn response_slot(call_id: u64) -> (ResponseSlot, ResponseReceiver) {
    let (tx, rx) = oneshot::channel();
    let slot = ResponseSlot {
        inner: Arc::new(SlotInner {
            call_id,
            sender: Mutex::new(Some(tx)),
        }),
    };
    (slot, ResponseReceiver { call_id, rx })
}

impl ResponseSlot {
    #[must_use]
    pub fn call_id(&self) -> u64 {
        self.inner.call_id
    }

    /// Writes the slot's one outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::AlreadyCompleted`] if the slot was written before.
    /// The second outcome is discarded.
    pub fn complete(&self, outcome: ResponseOutcome) -> Result<(), SlotError> {
        let call_id = self.inner.call_id;
        let Some(tx) = self.inner.sender.lock().take() else {
            error!(call_id, ?outcome, "response slot completed twice");
            return Err(SlotError::AlreadyCompleted { call_id });
        };
        if tx.send(outcome).is_err() {
            debug!(call_id, "response receiver dropped before completion");
        }
        Ok(())
    }

    /// Writes `Failed(err)` unless an outcome was already written.
    /// Returns whether this call completed the slot.
    pub fn fail_if_open(&self, err: DispatchError) -> bool {
        let Some(tx) = self.inner.sender.lock().take() else {
            return false;
        };
        let _ = tx.send(ResponseOutcome::Failed(err));
        true
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.inner.sender.lock().is_none()
    }
}

impl fmt::Debug for ResponseSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSlot")
            .field("call_id", &self.inner.call_id)
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl ResponseReceiver {
    #[must_use]
    pub fn call_id(&self) -> u64 {
        self.call_id
    }

    /// Waits for the slot's outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::Abandoned`] when every slot handle was dropped
    /// without completing.
    pub async fn recv(self) -> Result<ResponseOutcome, SlotError> {
        self.rx.await.map_err(|_| SlotError::Abandoned)
    }
}

impl fmt::Debug for ResponseReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseReceiver")
            .field("call_id", &self.call_id)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
