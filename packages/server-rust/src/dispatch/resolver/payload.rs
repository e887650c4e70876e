//! Payload decoding, required-content enforcement and validation.

use std::sync::Arc;

use async_trait::async_trait;
use packetmap_core::{CodecRegistry, TypedValue};

use super::{resolution_error, ArgumentResolver};
use crate::dispatch::error::DispatchError;
use crate::dispatch::handler::{MethodParameter, ParameterKind};
use crate::dispatch::message::InboundMessage;
use crate::dispatch::validation::{ValidationResult, Validator};

/// Decodes the message payload into the parameter's type.
///
/// Always the last resolver in the chain. With default resolution enabled it
/// also claims un-annotated parameters nothing earlier supported.
pub struct PayloadResolver {
    codecs: CodecRegistry,
    validator: Option<Arc<dyn Validator>>,
    default_resolution: bool,
}

impl PayloadResolver {
    #[must_use]
    pub fn new(
        codecs: CodecRegistry,
        validator: Option<Arc<dyn Validator>>,
        default_resolution: bool,
    ) -> Self {
        Self {
            codecs,
            validator,
            default_resolution,
        }
    }

    fn validate(
        &self,
        method: &str,
        param: &MethodParameter,
        value: &TypedValue,
    ) -> Result<(), DispatchError> {
        let Some(validator) = self.validator.as_ref().filter(|v| v.supports(&param.ty)) else {
            return Ok(());
        };
        match validator.validate(value) {
            ValidationResult::Valid => Ok(()),
            ValidationResult::Invalid { errors } => Err(DispatchError::ValidationFailed {
                method: method.to_string(),
                name: param.name,
                errors,
            }),
        }
    }
}

#[async_trait]
impl ArgumentResolver for PayloadResolver {
    fn supports(&self, param: &MethodParameter) -> bool {
        match param.kind {
            ParameterKind::Payload => true,
            ParameterKind::Plain => self.default_resolution,
            _ => false,
        }
    }

    async fn resolve(
        &self,
        method: &str,
        param: &MethodParameter,
        message: &InboundMessage,
    ) -> Result<Option<TypedValue>, DispatchError> {
        let kind = message.content_kind();
        let decoder = self.codecs.decoder_for(&param.ty, kind)?;
        let value = decoder
            .decode(message.take_payload_or_empty(), &param.ty, kind)
            .await
            .map_err(|e| resolution_error(method, param, e.to_string()))?;

        let Some(value) = value else {
            if param.required {
                return Err(resolution_error(method, param, "Payload content is missing"));
            }
            return Ok(None);
        };
        if param.validated {
            self.validate(method, param, &value)?;
        }
        Ok(Some(value))
    }
}
