//! Metrics middleware for dispatches.
//!
//! Wraps each dispatch in a `tracing` span carrying its duration and
//! outcome, and records the same data through the `metrics` facade.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::dispatch::dispatcher::Dispatched;
use crate::dispatch::error::DispatchError;
use crate::dispatch::message::InboundMessage;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments dispatches with timing and counting.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Records dispatch duration and outcome in spans and metrics.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<InboundMessage> for MetricsService<S>
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
        let call_id = message.call_id();
        let destination = message.destination();

        let span = info_span!(
            "dispatch",
            call_id = call_id,
            destination = %destination,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(message);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(err) => err.kind(),
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                metrics::counter!("packet_dispatch_total", "outcome" => outcome).increment(1);
                metrics::histogram!("packet_dispatch_duration_seconds")
                    .record(elapsed.as_secs_f64());

                tracing::debug!(
                    call_id = call_id,
                    duration_ms = duration_ms,
                    outcome = outcome,
                    "dispatch complete"
                );

                result
            }
            .instrument(span),
        )
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

    /// Immediately-completing service for metrics testing.
    struct ImmediateService;

    impl Service<InboundMessage> for ImmediateService {
        type Response = Dispatched;
        type Error = DispatchError;
        type Future = Pin<Box<dyn Future<Output = Result<Dispatched, DispatchError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, message: InboundMessage) -> Self::Future {
            let call_id = message.call_id();
            let destination = message.destination();
            Box::pin(async move {
                Ok(Dispatched {
                    call_id,
                    destination,
                    controller: "immediate",
                    method: "now",
                })
            })
        }
    }

    #[tokio::test]
    async fn metrics_layer_passes_through_response() {
        let (message, _rx) = PacketClassifier::new(Arc::new(DispatcherConfig::default()))
            .classify(RawPacket::to_destination(
                RouteKey::new(4, 2),
                &PacketPayload::from_text(""),
            ))
            .unwrap();
        let call_id = message.call_id();

        let dispatched = MetricsLayer.layer(ImmediateService).oneshot(message).await.unwrap();
        assert_eq!(dispatched.call_id, call_id);
        assert_eq!(dispatched.destination, RouteKey::new(4, 2));
    }
}
