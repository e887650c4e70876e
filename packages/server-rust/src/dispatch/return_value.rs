//! Return value handling: encodes handler results into reply packets and
//! writes them into the message's response slot.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{future, stream, FutureExt, Stream, StreamExt};
use packetmap_core::codec::collect_bytes;
use packetmap_core::{CodecRegistry, ContentKind, PacketPayload, TypedValue};

use super::error::DispatchError;
use super::handler::HandlerReturn;
use super::message::InboundMessage;
use super::response::{OutboundPacket, ResponseOutcome};
use super::route_table::HandlerRegistration;

type PacketFuture = BoxFuture<'static, Result<OutboundPacket, DispatchError>>;

/// Turns a [`HandlerReturn`] into the message's one [`ResponseOutcome`].
#[derive(Debug, Clone)]
pub struct ReturnValueHandler {
    codecs: CodecRegistry,
}

impl ReturnValueHandler {
    #[must_use]
    pub fn new(codecs: CodecRegistry) -> Self {
        Self { codecs }
    }

    /// Completes the message's response slot from `ret`.
    ///
    /// Single values pick their encoder before the slot is written, so a
    /// missing codec fails the dispatch instead of the stream. Streams are
    /// polled for their first element up front: one that ends without
    /// yielding completes the slot with no content. Stream elements resolve
    /// their target and encoder one by one as the transport polls.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoCodecAvailable`] when a single value has no
    /// encoder, or [`DispatchError::Response`] if the slot was already
    /// completed.
    pub async fn handle(
        &self,
        ret: HandlerReturn,
        registration: &Arc<HandlerRegistration>,
        message: &InboundMessage,
    ) -> Result<(), DispatchError> {
        let kind = message.content_kind().clone();
        let outcome = match ret {
            HandlerReturn::Empty => ResponseOutcome::NoContent,
            HandlerReturn::Single(value) => {
                let packet = prepare(&self.codecs, registration, value, &kind)?;
                ResponseOutcome::Content(stream::once(packet).boxed())
            }
            HandlerReturn::Stream(mut values) => match values.next().await {
                None => ResponseOutcome::NoContent,
                Some(first) => {
                    let values = stream::once(future::ready(first)).chain(values);
                    self.stream_outcome(values, registration, kind)
                }
            },
        };
        message
            .response()
            .complete(outcome)
            .map_err(|e| DispatchError::Response(e.to_string()))
    }

    fn stream_outcome(
        &self,
        values: impl Stream<Item = anyhow::Result<TypedValue>> + Send + 'static,
        registration: &Arc<HandlerRegistration>,
        kind: ContentKind,
    ) -> ResponseOutcome {
        let codecs = self.codecs.clone();
        let registration = Arc::clone(registration);
        let packets = values.then(move |item| {
            let prepared = item
                .map_err(|cause| DispatchError::HandlerFailed {
                    method: registration.qualified_name(),
                    cause: Arc::new(cause),
                })
                .and_then(|value| prepare(&codecs, &registration, value, &kind));
            async move { prepared?.await }
        });
        ResponseOutcome::Content(packets.boxed())
    }
}

/// Resolves the outbound target and encoder for `value` now; encoding runs
/// when the returned future is polled.
fn prepare(
    codecs: &CodecRegistry,
    registration: &HandlerRegistration,
    value: TypedValue,
    kind: &ContentKind,
) -> Result<PacketFuture, DispatchError> {
    let ty = value.type_key();
    let target = registration.outbound_target(&ty);
    let encoder = codecs.encoder_for(&ty, kind)?;
    let body = encoder.encode(value, kind);
    Ok(async move {
        let data = collect_bytes(body).await?.unwrap_or_else(Bytes::new);
        Ok(OutboundPacket::new(target, PacketPayload::from(data)))
    }
    .boxed())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use packetmap_core::{
        Direction, GroupMatch, OutboundMapping, OutboundTarget, PacketMapping, RouteCondition,
        RouteKey,
    };

    use super::*;
    use crate::dispatch::classify::PacketClassifier;
    use crate::dispatch::config::DispatcherConfig;
    use crate::dispatch::handler::{HandlerMethod, PacketController};
    use crate::dispatch::message::RawPacket;
    use crate::dispatch::response::ResponseReceiver;

    struct Owner;

    impl PacketController for Owner {
        fn name(&self) -> &'static str {
            "owner"
        }

        fn mapping(&self) -> Option<PacketMapping> {
            Some(PacketMapping::new().with_outbound(OutboundMapping::group(5)))
        }

        fn handler_methods(self: Arc<Self>) -> Vec<HandlerMethod> {
            Vec::new()
        }
    }

    fn registration() -> Arc<HandlerRegistration> {
        let method = HandlerMethod::new("reply", |_| async { Ok(HandlerReturn::Empty) })
            .with_mapping(
                PacketMapping::inbound_cmd(1)
                    .with_outbound(OutboundMapping::default().target::<String>(0, 1)),
            );
        Arc::new(HandlerRegistration {
            seq: 0,
            condition: RouteCondition::new(GroupMatch::Exact(1), 1, Direction::Inbound),
            controller: Arc::new(Owner),
            controller_mapping: Owner.mapping(),
            method,
            argument_types: Vec::new(),
        })
    }

    fn message() -> (InboundMessage, ResponseReceiver) {
        let classifier = PacketClassifier::new(Arc::new(DispatcherConfig::default()));
        classifier
            .classify(RawPacket::to_destination(
                RouteKey::new(1, 1),
                &PacketPayload::from_text(""),
            ))
            .unwrap()
    }

    fn handler() -> ReturnValueHandler {
        ReturnValueHandler::new(CodecRegistry::with_defaults())
    }

    #[tokio::test]
    async fn empty_return_is_no_content() {
        let (msg, rx) = message();
        handler()
            .handle(HandlerReturn::Empty, &registration(), &msg)
            .await
            .unwrap();
        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome, ResponseOutcome::NoContent));
    }

    #[tokio::test]
    async fn string_reply_targets_class_group() {
        let (msg, rx) = message();
        handler()
            .handle(HandlerReturn::value("ok".to_string()), &registration(), &msg)
            .await
            .unwrap();
        let packets = rx.recv().await.unwrap().into_packets().await.unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].target, Some(OutboundTarget::new(5, 1)));
        assert_eq!(packets[0].payload.data_utf8().unwrap(), "ok");
    }

    #[tokio::test]
    async fn untargeted_types_reply_on_request_key() {
        let (msg, rx) = message();
        handler()
            .handle(HandlerReturn::value(Bytes::from_static(b"raw")), &registration(), &msg)
            .await
            .unwrap();
        let packets = rx.recv().await.unwrap().into_packets().await.unwrap();
        assert_eq!(packets[0].target, None);
        assert_eq!(packets[0].reply_key(RouteKey::new(1, 1)), RouteKey::new(1, 1));
    }

    #[tokio::test]
    async fn single_without_encoder_fails_eagerly() {
        let (msg, _rx) = message();
        let err = handler()
            .handle(HandlerReturn::value(3.5_f64), &registration(), &msg)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoCodecAvailable(_)));
        assert!(!msg.response().is_completed());
    }

    #[tokio::test]
    async fn stream_elements_encode_independently() {
        let (msg, rx) = message();
        let values = futures_util::stream::iter(vec![
            Ok(TypedValue::new("a".to_string())),
            Ok(TypedValue::new(Bytes::from_static(b"b"))),
            Err(anyhow::anyhow!("boom")),
        ]);
        handler()
            .handle(HandlerReturn::Stream(values.boxed()), &registration(), &msg)
            .await
            .unwrap();

        let ResponseOutcome::Content(stream) = rx.recv().await.unwrap() else {
            panic!("expected content");
        };
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().target, Some(OutboundTarget::new(5, 1)));
        assert_eq!(items[1].as_ref().unwrap().target, None);
        assert!(matches!(items[2], Err(DispatchError::HandlerFailed { .. })));
    }

    #[tokio::test]
    async fn stream_without_elements_is_no_content() {
        let (msg, rx) = message();
        handler()
            .handle(HandlerReturn::values(Vec::<String>::new()), &registration(), &msg)
            .await
            .unwrap();
        assert!(matches!(rx.recv().await.unwrap(), ResponseOutcome::NoContent));
    }

    #[tokio::test]
    async fn second_completion_is_reported() {
        let (msg, _rx) = message();
        let reg = registration();
        handler().handle(HandlerReturn::Empty, &reg, &msg).await.unwrap();
        let err = handler()
            .handle(HandlerReturn::Empty, &reg, &msg)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Response(_)));
    }
}
