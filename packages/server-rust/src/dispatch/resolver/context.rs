//! Resolvers for per-call context objects.

use async_trait::async_trait;
use packetmap_core::TypedValue;
use tokio_util::sync::CancellationToken;

use super::{resolution_error, ArgumentResolver};
use crate::dispatch::error::DispatchError;
use crate::dispatch::handler::MethodParameter;
use crate::dispatch::message::{InboundMessage, PACKET_REQUESTER_HEADER};
use crate::dispatch::requester::PacketRequester;

/// Supplies the connection's [`PacketRequester`] from the `packetRequester`
/// header.
pub struct RequesterResolver;

#[async_trait]
impl ArgumentResolver for RequesterResolver {
    fn supports(&self, param: &MethodParameter) -> bool {
        param.ty.is::<PacketRequester>()
    }

    async fn resolve(
        &self,
        method: &str,
        param: &MethodParameter,
        message: &InboundMessage,
    ) -> Result<Option<TypedValue>, DispatchError> {
        let Some(value) = message.header(PACKET_REQUESTER_HEADER) else {
            if param.required {
                return Err(resolution_error(
                    method,
                    param,
                    format!("Missing '{PACKET_REQUESTER_HEADER}'"),
                ));
            }
            return Ok(None);
        };
        value
            .downcast_ref::<PacketRequester>()
            .map(|requester| Some(TypedValue::new(requester.clone())))
            .ok_or_else(|| {
                resolution_error(method, param, "Expected header value of type PacketRequester")
            })
    }
}

/// Supplies the message's cancellation token so handlers can observe
/// cancellation cooperatively.
pub struct CancellationResolver;

#[async_trait]
impl ArgumentResolver for CancellationResolver {
    fn supports(&self, param: &MethodParameter) -> bool {
        param.ty.is::<CancellationToken>()
    }

    async fn resolve(
        &self,
        _method: &str,
        _param: &MethodParameter,
        message: &InboundMessage,
    ) -> Result<Option<TypedValue>, DispatchError> {
        Ok(Some(TypedValue::new(message.cancellation().clone())))
    }
}
