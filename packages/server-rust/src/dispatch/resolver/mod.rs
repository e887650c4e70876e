//! Argument resolution: maps each handler parameter to a value taken from
//! the inbound message.
//!
//! Resolvers are consulted in a fixed order (header, headers, destination
//! variable, requester, cancellation, custom resolvers, payload) and the
//! first one whose `supports` accepts a parameter resolves it.

mod context;
mod header;
mod payload;

use std::sync::Arc;

use async_trait::async_trait;
use packetmap_core::{CodecRegistry, TypedValue};

use super::error::DispatchError;
use super::handler::{Arguments, MethodParameter};
use super::message::InboundMessage;
use super::route_table::HandlerRegistration;
use super::validation::Validator;

pub use context::{CancellationResolver, RequesterResolver};
pub use header::{DestinationVariableResolver, HeaderResolver, HeadersResolver};
pub use payload::PayloadResolver;

// ---------------------------------------------------------------------------
// ArgumentResolver trait
// ---------------------------------------------------------------------------

/// Strategy producing one argument value.
#[async_trait]
pub trait ArgumentResolver: Send + Sync {
    fn supports(&self, param: &MethodParameter) -> bool;

    /// Resolves `param` for the handler `method`. `Ok(None)` passes an absent
    /// optional argument.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] when the value is required but missing,
    /// cannot be converted, or fails validation.
    async fn resolve(
        &self,
        method: &str,
        param: &MethodParameter,
        message: &InboundMessage,
    ) -> Result<Option<TypedValue>, DispatchError>;
}

pub(crate) fn resolution_error(
    method: &str,
    param: &MethodParameter,
    reason: impl Into<String>,
) -> DispatchError {
    DispatchError::ArgumentResolution {
        method: method.to_string(),
        name: param.name,
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// ArgumentResolverChain
// ---------------------------------------------------------------------------

/// Ordered resolvers, immutable once built.
#[derive(Clone)]
pub struct ArgumentResolverChain {
    resolvers: Vec<Arc<dyn ArgumentResolver>>,
}

impl ArgumentResolverChain {
    /// Builds the standard chain with `custom` resolvers slotted in before the
    /// payload resolver.
    #[must_use]
    pub fn new(
        custom: Vec<Arc<dyn ArgumentResolver>>,
        codecs: CodecRegistry,
        validator: Option<Arc<dyn Validator>>,
        payload_default_resolution: bool,
    ) -> Self {
        let mut resolvers: Vec<Arc<dyn ArgumentResolver>> = vec![
            Arc::new(HeaderResolver),
            Arc::new(HeadersResolver),
            Arc::new(DestinationVariableResolver),
            Arc::new(RequesterResolver),
            Arc::new(CancellationResolver),
        ];
        resolvers.extend(custom);
        resolvers.push(Arc::new(PayloadResolver::new(
            codecs,
            validator,
            payload_default_resolution,
        )));
        Self { resolvers }
    }

    /// The first resolver supporting `param`.
    #[must_use]
    pub fn resolver_for(&self, param: &MethodParameter) -> Option<&Arc<dyn ArgumentResolver>> {
        self.resolvers.iter().find(|r| r.supports(param))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Resolves every parameter of `registration` in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnsupportedParameter`] when no resolver
    /// supports a parameter, or the first resolver failure.
    pub async fn resolve_arguments(
        &self,
        registration: &HandlerRegistration,
        message: &InboundMessage,
    ) -> Result<Arguments, DispatchError> {
        let method = registration.qualified_name();
        let params = registration.method.params();
        let mut values = Vec::with_capacity(params.len());
        for param in params {
            let resolver =
                self.resolver_for(param)
                    .ok_or_else(|| DispatchError::UnsupportedParameter {
                        method: method.clone(),
                        index: param.index,
                        name: param.name,
                    })?;
            values.push(resolver.resolve(&method, param, message).await?);
        }
        Ok(Arguments::new(registration.method.name(), values))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use packetmap_core::{
        Direction, GroupMatch, OutboundTarget, PacketPayload, RouteCondition, RouteKey, TypeKey,
    };
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::dispatch::classify::PacketClassifier;
    use crate::dispatch::config::DispatcherConfig;
    use crate::dispatch::handler::{HandlerMethod, HandlerReturn, PacketController};
    use crate::dispatch::message::{
        HeaderValue, MessageHeaders, RawPacket, PACKET_REQUESTER_HEADER,
    };
    use crate::dispatch::requester::{PacketRequester, PacketSender};
    use crate::dispatch::validation::{FnValidator, ValidationResult};

    struct Owner;

    impl PacketController for Owner {
        fn name(&self) -> &'static str {
            "owner"
        }

        fn handler_methods(self: Arc<Self>) -> Vec<HandlerMethod> {
            Vec::new()
        }
    }

    struct NullSender;

    impl PacketSender for NullSender {
        fn send(
            &self,
            _target: OutboundTarget,
            _payload: PacketPayload,
        ) -> BoxFuture<'static, anyhow::Result<()>> {
            async { Ok(()) }.boxed()
        }
    }

    fn registration(params: Vec<MethodParameter>) -> HandlerRegistration {
        let method = params.into_iter().fold(
            HandlerMethod::new("handle", |_| async { Ok(HandlerReturn::Empty) }),
            HandlerMethod::with_param,
        );
        HandlerRegistration {
            seq: 0,
            condition: RouteCondition::new(GroupMatch::Exact(1), 1, Direction::Inbound),
            controller: Arc::new(Owner),
            controller_mapping: None,
            argument_types: method.params().iter().map(|p| p.ty).collect(),
            method,
        }
    }

    fn message(packet: RawPacket) -> InboundMessage {
        let classifier = PacketClassifier::new(Arc::new(DispatcherConfig::default()));
        classifier.classify(packet).unwrap().0
    }

    fn text_packet(body: &str) -> RawPacket {
        RawPacket::to_destination(RouteKey::new(1, 1), &PacketPayload::from_text(body))
    }

    fn chain() -> ArgumentResolverChain {
        ArgumentResolverChain::new(Vec::new(), CodecRegistry::with_defaults(), None, true)
    }

    #[tokio::test]
    async fn resolves_headers_payload_and_context() {
        let requester = PacketRequester::new(Arc::new(NullSender));
        let packet = text_packet("abcdef")
            .with_header("zone", 12_i64)
            .with_header(PACKET_REQUESTER_HEADER, HeaderValue::any(requester));
        let msg = message(packet);
        let reg = registration(vec![
            MethodParameter::header::<i32>("zone"),
            MethodParameter::payload::<String>("body"),
            MethodParameter::headers("all"),
            MethodParameter::of::<PacketRequester>("requester"),
            MethodParameter::of::<CancellationToken>("cancel"),
        ]);

        let mut args = chain().resolve_arguments(&reg, &msg).await.unwrap();
        assert_eq!(args.take::<i32>(0).unwrap(), 12);
        assert_eq!(args.take::<String>(1).unwrap(), "abcdef");
        assert_eq!(args.take::<MessageHeaders>(2).unwrap().len(), 3);
        assert!(args.take::<PacketRequester>(3).is_ok());
        assert!(!args.take::<CancellationToken>(4).unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn missing_header_uses_default_or_fails() {
        let msg = message(text_packet(""));
        let reg = registration(vec![MethodParameter::header::<i32>("zone").default_value(3)]);
        let mut args = chain().resolve_arguments(&reg, &msg).await.unwrap();
        assert_eq!(args.take::<i32>(0).unwrap(), 3);

        let reg = registration(vec![MethodParameter::header::<i32>("zone")]);
        let err = chain().resolve_arguments(&reg, &msg).await.unwrap_err();
        assert!(err.to_string().contains("Missing header 'zone'"));
    }

    #[tokio::test]
    async fn destination_variables_are_converted() {
        let mut msg = message(text_packet(""));
        msg.set_destination_vars([("zone".to_string(), 42)].into_iter().collect());
        let reg = registration(vec![MethodParameter::destination_variable::<u16>("zone")]);
        let mut args = chain().resolve_arguments(&reg, &msg).await.unwrap();
        assert_eq!(args.take::<u16>(0).unwrap(), 42);
    }

    #[tokio::test]
    async fn requester_errors_mirror_header_state() {
        let reg = registration(vec![MethodParameter::of::<PacketRequester>("requester")]);

        let err = chain()
            .resolve_arguments(&reg, &message(text_packet("")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Missing 'packetRequester'"));

        let wrong = text_packet("").with_header(PACKET_REQUESTER_HEADER, "not a requester");
        let err = chain()
            .resolve_arguments(&reg, &message(wrong))
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Expected header value of type PacketRequester"));
    }

    #[tokio::test]
    async fn empty_required_payload_is_missing() {
        let msg = message(text_packet(""));
        let reg = registration(vec![MethodParameter::payload::<String>("body")]);
        let err = chain().resolve_arguments(&reg, &msg).await.unwrap_err();
        assert!(err.to_string().contains("Payload content is missing"));

        let reg = registration(vec![MethodParameter::payload::<String>("body").optional()]);
        let mut args = chain().resolve_arguments(&reg, &msg).await.unwrap();
        assert_eq!(args.take_opt::<String>(0).unwrap(), None);
    }

    #[tokio::test]
    async fn unsupported_parameter_without_default_resolution() {
        let chain =
            ArgumentResolverChain::new(Vec::new(), CodecRegistry::with_defaults(), None, false);
        let reg = registration(vec![
            MethodParameter::payload::<String>("body"),
            MethodParameter::of::<String>("extra"),
        ]);
        let err = chain
            .resolve_arguments(&reg, &message(text_packet("x")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::UnsupportedParameter { index: 1, name: "extra", .. }
        ));
    }

    #[tokio::test]
    async fn missing_decoder_is_no_codec() {
        let reg = registration(vec![MethodParameter::payload::<u64>("n")]);
        let err = chain()
            .resolve_arguments(&reg, &message(text_packet("1")))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoCodecAvailable(_)));
    }

    #[tokio::test]
    async fn validator_runs_on_validated_payloads() {
        let validator: Arc<dyn Validator> = Arc::new(FnValidator::new(|s: &String| {
            if s.len() > 3 {
                ValidationResult::invalid("too long")
            } else {
                ValidationResult::Valid
            }
        }));
        let chain = ArgumentResolverChain::new(
            Vec::new(),
            CodecRegistry::with_defaults(),
            Some(validator),
            true,
        );
        let reg = registration(vec![MethodParameter::payload::<String>("body").validated()]);
        let err = chain
            .resolve_arguments(&reg, &message(text_packet("abcdef")))
            .await
            .unwrap_err();
        let DispatchError::ValidationFailed { errors, .. } = err else {
            panic!("expected validation failure, got {err:?}");
        };
        assert_eq!(errors, ["too long"]);

        let reg = registration(vec![MethodParameter::payload::<String>("body")]);
        assert!(chain
            .resolve_arguments(&reg, &message(text_packet("abcdef")))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn custom_resolvers_precede_payload() {
        struct Zone;

        #[async_trait]
        impl ArgumentResolver for Zone {
            fn supports(&self, param: &MethodParameter) -> bool {
                param.ty == TypeKey::of::<u32>()
            }

            async fn resolve(
                &self,
                _method: &str,
                _param: &MethodParameter,
                _message: &InboundMessage,
            ) -> Result<Option<TypedValue>, DispatchError> {
                Ok(Some(TypedValue::new(77_u32)))
            }
        }

        let chain = ArgumentResolverChain::new(
            vec![Arc::new(Zone)],
            CodecRegistry::with_defaults(),
            None,
            true,
        );
        assert_eq!(chain.len(), 7);
        let reg = registration(vec![MethodParameter::of::<u32>("zone")]);
        let mut args = chain
            .resolve_arguments(&reg, &message(text_packet("")))
            .await
            .unwrap();
        assert_eq!(args.take::<u32>(0).unwrap(), 77);
    }
}
