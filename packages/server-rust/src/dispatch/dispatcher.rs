//! Packet dispatching: finds the handler for a classified message, resolves
//! its arguments, invokes it and hands the result to the return value
//! handler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use packetmap_core::{CodecRegistry, RouteKey};
use tower::Service;
use tracing::{debug, warn};

use super::config::DispatcherConfig;
use super::error::DispatchError;
use super::handlers::HandlerRegistry;
use super::message::InboundMessage;
use super::resolver::{ArgumentResolver, ArgumentResolverChain};
use super::return_value::ReturnValueHandler;
use super::route_table::RouteMatch;
use super::validation::Validator;

/// Result of a successful dispatch. The reply itself travels through the
/// message's response slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub call_id: u64,
    pub destination: RouteKey,
    pub controller: &'static str,
    pub method: &'static str,
}

struct DispatcherInner {
    handlers: Arc<HandlerRegistry>,
    resolvers: ArgumentResolverChain,
    returns: ReturnValueHandler,
}

// ---------------------------------------------------------------------------
// PacketDispatcher
// ---------------------------------------------------------------------------

/// Routes [`InboundMessage`]s to registered handler methods.
///
/// Cheap to clone; clones share the handler registry, so routes registered
/// after construction are visible to every clone.
#[derive(Clone)]
pub struct PacketDispatcher {
    inner: Arc<DispatcherInner>,
}

impl PacketDispatcher {
    #[must_use]
    pub fn builder() -> PacketDispatcherBuilder {
        PacketDispatcherBuilder::default()
    }

    #[must_use]
    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.inner.handlers
    }

    /// Dispatches one message.
    ///
    /// Races the dispatch against the message's cancellation token. On any
    /// failure the response slot is completed with the error unless the
    /// handler path already wrote it.
    ///
    /// # Errors
    ///
    /// Returns the [`DispatchError`] that ended the dispatch.
    pub async fn dispatch(&self, message: InboundMessage) -> Result<Dispatched, DispatchError> {
        let cancellation = message.cancellation().clone();
        let slot = message.response().clone();
        let result = tokio::select! {
            biased;
            () = cancellation.cancelled() => Err(DispatchError::Cancelled),
            result = self.run(message) => result,
        };
        if let Err(err) = &result {
            slot.fail_if_open(err.clone());
        }
        result
    }

    async fn run(&self, mut message: InboundMessage) -> Result<Dispatched, DispatchError> {
        let call_id = message.call_id();
        let destination = message.destination();
        let direction = message.direction();

        let table = self.inner.handlers.table();
        let Some(RouteMatch {
            registration,
            variables,
        }) = table.find(direction, destination)
        else {
            warn!(call_id, %destination, %direction, "no handler for packet");
            metrics::counter!("packet_dispatch_no_route_total").increment(1);
            return Err(DispatchError::NoRouteFound {
                destination,
                direction,
            });
        };
        message.set_destination_vars(variables);

        let args = self
            .inner
            .resolvers
            .resolve_arguments(&registration, &message)
            .await?;

        debug!(call_id, method = %registration.qualified_name(), "invoking handler");
        let ret = match registration.method.invoke(args).await {
            Ok(ret) => ret,
            Err(cause) => {
                let handled = registration
                    .controller
                    .handle_exception(registration.method.name(), &cause);
                match handled {
                    Some(ret) => {
                        debug!(call_id, error = %cause, "handler failure mapped by controller");
                        ret
                    }
                    None => {
                        return Err(DispatchError::HandlerFailed {
                            method: registration.qualified_name(),
                            cause: Arc::new(cause),
                        })
                    }
                }
            }
        };

        self.inner
            .returns
            .handle(ret, &registration, &message)
            .await?;

        Ok(Dispatched {
            call_id,
            destination,
            controller: registration.controller.name(),
            method: registration.method.name(),
        })
    }
}

impl Service<InboundMessage> for PacketDispatcher {
    type Response = Dispatched;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<Dispatched, DispatchError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, message: InboundMessage) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move { dispatcher.dispatch(message).await })
    }
}

// ---------------------------------------------------------------------------
// PacketDispatcherBuilder
// ---------------------------------------------------------------------------

/// Assembles a [`PacketDispatcher`]. Every part has a default.
#[derive(Default)]
pub struct PacketDispatcherBuilder {
    handlers: Option<Arc<HandlerRegistry>>,
    codecs: Option<CodecRegistry>,
    validator: Option<Arc<dyn Validator>>,
    resolvers: Vec<Arc<dyn ArgumentResolver>>,
    config: DispatcherConfig,
}

impl PacketDispatcherBuilder {
    /// Shares an existing handler registry instead of creating one.
    #[must_use]
    pub fn handler_registry(mut self, handlers: Arc<HandlerRegistry>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Codecs used for payload decoding and reply encoding. Defaults to
    /// [`CodecRegistry::with_defaults`].
    #[must_use]
    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = Some(codecs);
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Adds a custom resolver, consulted after the built-in context
    /// resolvers and before payload resolution.
    #[must_use]
    pub fn resolver(mut self, resolver: impl ArgumentResolver + 'static) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    #[must_use]
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn build(self) -> PacketDispatcher {
        let codecs = self.codecs.unwrap_or_else(CodecRegistry::with_defaults);
        let resolvers = ArgumentResolverChain::new(
            self.resolvers,
            codecs.clone(),
            self.validator,
            self.config.payload_default_resolution,
        );
        PacketDispatcher {
            inner: Arc::new(DispatcherInner {
                handlers: self.handlers.unwrap_or_default(),
                resolvers,
                returns: ReturnValueHandler::new(codecs),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use packetmap_core::{Direction, PacketMapping, PacketPayload};
    use tower::ServiceExt;

    use super::*;
    use crate::dispatch::classify::PacketClassifier;
    use crate::dispatch::handler::{HandlerMethod, HandlerReturn, MethodParameter, PacketController};
    use crate::dispatch::message::RawPacket;
    use crate::dispatch::response::{ResponseOutcome, ResponseReceiver};

    struct Shouty;

    impl PacketController for Shouty {
        fn name(&self) -> &'static str {
            "shouty"
        }

        fn handler_methods(self: Arc<Self>) -> Vec<HandlerMethod> {
            vec![
                HandlerMethod::new("shout", |mut args| async move {
                    let body: String = args.take(0)?;
                    Ok(HandlerReturn::value(body.to_uppercase()))
                })
                .with_mapping(PacketMapping::inbound_pattern("3.1").unwrap_or_default())
                .with_param(MethodParameter::payload::<String>("body")),
                HandlerMethod::new("fail", |_| async { Err(anyhow::anyhow!("nope")) })
                    .with_mapping(PacketMapping::inbound_pattern("3.2").unwrap_or_default()),
                HandlerMethod::new("recover", |_| async { Err(anyhow::anyhow!("bad input")) })
                    .with_mapping(PacketMapping::inbound_pattern("3.3").unwrap_or_default()),
            ]
        }

        fn handle_exception(&self, method: &str, err: &anyhow::Error) -> Option<HandlerReturn> {
            (method == "recover").then(|| HandlerReturn::value(format!("recovered: {err}")))
        }
    }

    fn dispatcher() -> PacketDispatcher {
        let dispatcher = PacketDispatcher::builder().build();
        dispatcher.handlers().register(Arc::new(Shouty)).unwrap();
        dispatcher
    }

    fn message(group: i32, cmd: i32, body: &str) -> (InboundMessage, ResponseReceiver) {
        PacketClassifier::new(Arc::new(DispatcherConfig::default()))
            .classify(RawPacket::to_destination(
                RouteKey::new(group, cmd),
                &PacketPayload::from_text(body),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn dispatches_to_matching_handler() {
        let (msg, rx) = message(3, 1, "hey");
        let dispatched = dispatcher().oneshot(msg).await.unwrap();
        assert_eq!(dispatched.controller, "shouty");
        assert_eq!(dispatched.method, "shout");

        let packets = rx.recv().await.unwrap().into_packets().await.unwrap();
        assert_eq!(packets[0].payload.data_utf8().unwrap(), "HEY");
    }

    #[tokio::test]
    async fn unknown_destination_fails_slot() {
        let (msg, rx) = message(9, 9, "");
        let err = dispatcher().dispatch(msg).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::NoRouteFound {
                direction: Direction::Inbound,
                ..
            }
        ));
        let outcome = rx.recv().await.unwrap();
        assert!(matches!(
            outcome,
            ResponseOutcome::Failed(DispatchError::NoRouteFound { .. })
        ));
    }

    #[tokio::test]
    async fn handler_errors_are_wrapped() {
        let (msg, rx) = message(3, 2, "");
        let err = dispatcher().dispatch(msg).await.unwrap_err();
        let DispatchError::HandlerFailed { method, .. } = err else {
            panic!("expected handler failure, got {err:?}");
        };
        assert_eq!(method, "shouty::fail");
        assert!(rx.recv().await.unwrap().is_failed());
    }

    #[tokio::test]
    async fn controller_can_map_handler_errors() {
        let (msg, rx) = message(3, 3, "");
        dispatcher().dispatch(msg).await.unwrap();
        let packets = rx.recv().await.unwrap().into_packets().await.unwrap();
        assert_eq!(packets[0].payload.data_utf8().unwrap(), "recovered: bad input");
    }

    #[tokio::test]
    async fn cancelled_message_is_not_dispatched() {
        let (msg, rx) = message(3, 1, "hey");
        msg.cancellation().cancel();
        let err = dispatcher().dispatch(msg).await.unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ResponseOutcome::Failed(DispatchError::Cancelled)
        ));
    }
}
