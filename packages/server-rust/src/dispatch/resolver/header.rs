//! Resolvers reading message headers and destination variables.

use async_trait::async_trait;
use packetmap_core::TypedValue;

use super::{resolution_error, ArgumentResolver};
use crate::dispatch::error::DispatchError;
use crate::dispatch::handler::{MethodParameter, ParameterKind};
use crate::dispatch::message::{HeaderValue, InboundMessage, MessageHeaders};

/// A single named header, converted to the parameter type.
pub struct HeaderResolver;

#[async_trait]
impl ArgumentResolver for HeaderResolver {
    fn supports(&self, param: &MethodParameter) -> bool {
        matches!(param.kind, ParameterKind::Header { .. })
    }

    async fn resolve(
        &self,
        method: &str,
        param: &MethodParameter,
        message: &InboundMessage,
    ) -> Result<Option<TypedValue>, DispatchError> {
        let ParameterKind::Header { name, default } = &param.kind else {
            return Ok(None);
        };
        let value = match (message.header(name), default) {
            (Some(value), _) | (None, Some(value)) => value,
            (None, None) if param.required => {
                return Err(resolution_error(
                    method,
                    param,
                    format!("Missing header '{name}'"),
                ));
            }
            (None, None) => return Ok(None),
        };
        param
            .convert(value)
            .map(Some)
            .map_err(|e| resolution_error(method, param, e.to_string()))
    }
}

/// The whole header map.
pub struct HeadersResolver;

#[async_trait]
impl ArgumentResolver for HeadersResolver {
    fn supports(&self, param: &MethodParameter) -> bool {
        matches!(param.kind, ParameterKind::Headers)
            || (param.kind == ParameterKind::Plain && param.ty.is::<MessageHeaders>())
    }

    async fn resolve(
        &self,
        _method: &str,
        _param: &MethodParameter,
        message: &InboundMessage,
    ) -> Result<Option<TypedValue>, DispatchError> {
        Ok(Some(TypedValue::new(message.headers().clone())))
    }
}

/// A `{name}` capture from the matched route.
pub struct DestinationVariableResolver;

#[async_trait]
impl ArgumentResolver for DestinationVariableResolver {
    fn supports(&self, param: &MethodParameter) -> bool {
        matches!(param.kind, ParameterKind::DestinationVariable(_))
    }

    async fn resolve(
        &self,
        method: &str,
        param: &MethodParameter,
        message: &InboundMessage,
    ) -> Result<Option<TypedValue>, DispatchError> {
        let ParameterKind::DestinationVariable(name) = param.kind else {
            return Ok(None);
        };
        let Some(group) = message.destination_vars().get(name) else {
            return Err(resolution_error(
                method,
                param,
                format!("Missing destination variable '{name}'"),
            ));
        };
        param
            .convert(&HeaderValue::Int(i64::from(*group)))
            .map(Some)
            .map_err(|e| resolution_error(method, param, e.to_string()))
    }
}
