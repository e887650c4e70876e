//! Server-initiated sends from inside handlers.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use packetmap_core::{OutboundTarget, PacketPayload};

/// Transport-side sink for packets the server pushes to a peer.
pub trait PacketSender: Send + Sync {
    fn send(
        &self,
        target: OutboundTarget,
        payload: PacketPayload,
    ) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// Handle a handler can request as a parameter to push packets to the peer
/// that sent the current message.
///
/// The transport places one in the `packetRequester` header.
#[derive(Clone)]
pub struct PacketRequester {
    sender: Arc<dyn PacketSender>,
}

impl PacketRequester {
    #[must_use]
    pub fn new(sender: Arc<dyn PacketSender>) -> Self {
        Self { sender }
    }

    /// Sends `payload` to `(group, cmd)`.
    ///
    /// # Errors
    ///
    /// Propagates the transport's send failure.
    pub async fn send(
        &self,
        group: i32,
        cmd: i32,
        payload: impl Into<PacketPayload>,
    ) -> anyhow::Result<()> {
        self.sender
            .send(OutboundTarget::new(group, cmd), payload.into())
            .await
    }
}

impl fmt::Debug for PacketRequester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketRequester").finish_non_exhaustive()
    }
}
