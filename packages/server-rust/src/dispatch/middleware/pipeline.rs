//! Pipeline composition: combines all middleware layers into a single service stack.

use std::future::Future;
use std::pin::Pin;

use tower::ServiceBuilder;

use super::completion::CompletionLayer;
use super::load_shed::LoadShedLayer;
use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::dispatch::config::DispatcherConfig;
use crate::dispatch::dispatcher::{Dispatched, PacketDispatcher};
use crate::dispatch::error::DispatchError;
use crate::dispatch::message::InboundMessage;

/// Wraps the `PacketDispatcher` with the middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `CompletionLayer` -- every failure ends up in the response slot
/// 2. `LoadShedLayer` -- reject when overloaded before doing any work
/// 3. `TimeoutLayer` -- enforce per-message timeouts
/// 4. `MetricsLayer` -- record timing and outcome closest to the dispatcher
#[must_use]
pub fn build_dispatch_pipeline(
    dispatcher: PacketDispatcher,
    config: &DispatcherConfig,
) -> impl tower::Service<
    InboundMessage,
    Response = Dispatched,
    Error = DispatchError,
    Future = Pin<Box<dyn Future<Output = Result<Dispatched, DispatchError>> + Send>>,
> + Clone
       + Send {
    ServiceBuilder::new()
        .layer(CompletionLayer)
        .layer(LoadShedLayer::new(config.max_concurrent_dispatches))
        .layer(TimeoutLayer)
        .layer(MetricsLayer)
        .service(dispatcher)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use packetmap_core::{PacketMapping, PacketPayload, RouteKey};
    use tower::ServiceExt;

    use super::*;
    use crate::dispatch::classify::PacketClassifier;
    use crate::dispatch::handler::{HandlerMethod, HandlerReturn, PacketController};
    use crate::dispatch::message::RawPacket;
    use crate::dispatch::response::ResponseOutcome;

    struct Sleepy;

    impl PacketController for Sleepy {
        fn name(&self) -> &'static str {
            "sleepy"
        }

        fn handler_methods(self: Arc<Self>) -> Vec<HandlerMethod> {
            vec![
                HandlerMethod::new("nap", |_| async {
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    Ok(HandlerReturn::Empty)
                })
                .with_mapping(PacketMapping::inbound_pattern("2.1").unwrap_or_default()),
                HandlerMethod::new("wake", |_| async { Ok(HandlerReturn::Empty) })
                    .with_mapping(PacketMapping::inbound_pattern("2.2").unwrap_or_default()),
            ]
        }
    }

    fn setup(config: DispatcherConfig) -> (PacketClassifier, PacketDispatcher) {
        let dispatcher = PacketDispatcher::builder().config(config.clone()).build();
        dispatcher.handlers().register(Arc::new(Sleepy)).unwrap();
        (PacketClassifier::new(Arc::new(config)), dispatcher)
    }

    fn packet(cmd: i32) -> RawPacket {
        RawPacket::to_destination(RouteKey::new(2, cmd), &PacketPayload::from_text(""))
    }

    #[tokio::test]
    async fn pipeline_routes_through_all_layers() {
        let config = DispatcherConfig::default();
        let (classifier, dispatcher) = setup(config.clone());
        let svc = build_dispatch_pipeline(dispatcher, &config);

        let (message, rx) = classifier.classify(packet(2)).unwrap();
        let dispatched = svc.oneshot(message).await.unwrap();
        assert_eq!(dispatched.method, "wake");
        assert!(matches!(rx.recv().await.unwrap(), ResponseOutcome::NoContent));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_completes_slot_with_failure() {
        let config = DispatcherConfig {
            default_timeout_ms: 100,
            ..DispatcherConfig::default()
        };
        let (classifier, dispatcher) = setup(config.clone());
        let svc = build_dispatch_pipeline(dispatcher, &config);

        let (message, rx) = classifier.classify(packet(1)).unwrap();
        let err = svc.oneshot(message).await.unwrap_err();
        assert!(matches!(err, DispatchError::Timeout { timeout_ms: 100 }));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ResponseOutcome::Failed(DispatchError::Timeout { .. })
        ));
    }
}
