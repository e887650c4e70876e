//! Completion middleware.
//!
//! Guarantees that a message whose dispatch fails anywhere in the pipeline
//! still gets an outcome in its response slot. Rejections from outer layers
//! such as load shedding or timeouts never reach the dispatcher, so this
//! layer sits outermost.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::{Layer, Service};

use crate::dispatch::dispatcher::Dispatched;
use crate::dispatch::error::DispatchError;
use crate::dispatch::message::InboundMessage;

#[derive(Debug, Clone)]
pub struct CompletionLayer;

impl<S> Layer<S> for CompletionLayer {
    type Service = CompletionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompletionService { inner }
    }
}

/// Writes `Failed(err)` into the slot of every message that errors.
#[derive(Debug, Clone)]
pub struct CompletionService<S> {
    inner: S,
}

impl<S> Service<InboundMessage> for CompletionService<S>
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
        let slot = message.response().clone();
        let fut = self.inner.call(message);
        Box::pin(async move {
            let result = fut.await;
            if let Err(err) = &result {
                slot.fail_if_open(err.clone());
            }
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
