//! Timeout middleware for dispatches.
//!
//! Rejects dispatches that exceed their `timeout_ms` with
//! `DispatchError::Timeout` and cancels the message's token so the handler
//! can stop early.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};

use crate::dispatch::dispatcher::Dispatched;
use crate::dispatch::error::DispatchError;
use crate::dispatch::message::InboundMessage;

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps services with per-message timeout enforcement.
///
/// The timeout is read from each message's call context, so packets may
/// carry different budgets.
#[derive(Debug, Clone)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService { inner }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
}

impl<S> Service<InboundMessage> for TimeoutService<S>
where
    S: Service<InboundMessage, Response = Dispatched, Error = DispatchError> + Send,
    S::Future: Send + 'static,
{
    type Response = Dispatched;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<Dispatched, DispatchError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, message: InboundMessage) -> Self::Future {
        let timeout_ms = message.call().timeout_ms;
        let cancellation = message.cancellation().clone();
        let fut = self.inner.call(message);
        Box::pin(async move {
            let duration = Duration::from_millis(timeout_ms);
            match tokio::time::timeout(duration, fut).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    cancellation.cancel();
                    Err(DispatchError::Timeout { timeout_ms })
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use packetmap_core::{PacketPayload, RouteKey};
    use tower::ServiceExt;

    use super::*;
    use crate::dispatch::classify::PacketClassifier;
    use crate::dispatch::config::DispatcherConfig;
    use crate::dispatch::message::RawPacket;

    /// Service that takes a configurable delay before responding.
    struct SlowService {
        delay_ms: u64,
    }

    impl Service<InboundMessage> for SlowService {
        type Response = Dispatched;
        type Error = DispatchError;
        type Future = Pin<Box<dyn Future<Output = Result<Dispatched, DispatchError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, message: InboundMessage) -> Self::Future {
            let delay = self.delay_ms;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(Dispatched {
                    call_id: message.call_id(),
                    destination: message.destination(),
                    controller: "slow",
                    method: "sleep",
                })
            })
        }
    }

    fn make_message(timeout_ms: u64) -> InboundMessage {
        let config = DispatcherConfig {
            default_timeout_ms: timeout_ms,
            ..DispatcherConfig::default()
        };
        let (message, _rx) = PacketClassifier::new(Arc::new(config))
            .classify(RawPacket::to_destination(
                RouteKey::new(1, 1),
                &PacketPayload::from_text(""),
            ))
            .unwrap();
        message
    }

    #[tokio::test]
    async fn completes_within_timeout() {
        let svc = TimeoutLayer.layer(SlowService { delay_ms: 10 });
        let dispatched = svc.oneshot(make_message(1000)).await.unwrap();
        assert_eq!(dispatched.controller, "slow");
    }

    #[tokio::test(start_paused = true)]
    async fn exceeds_timeout_returns_error_and_cancels() {
        let svc = TimeoutLayer.layer(SlowService { delay_ms: 200 });
        let message = make_message(50);
        let token = message.cancellation().clone();
        let err = svc.oneshot(message).await.unwrap_err();
        assert!(matches!(err, DispatchError::Timeout { timeout_ms: 50 }));
        assert!(token.is_cancelled());
    }
}
