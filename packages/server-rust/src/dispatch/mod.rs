//! Packet dispatch: route table, argument resolution, handler invocation and
//! reply correlation, exposed as a `tower::Service` pipeline.
//!
//! A transport turns each frame into a [`RawPacket`], classifies it with a
//! [`PacketClassifier`] and drives the message through
//! [`build_dispatch_pipeline`]. The reply arrives on the
//! [`ResponseReceiver`] returned by classification.

pub mod classify;
pub mod components;
pub mod config;
pub mod convert;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod message;
pub mod middleware;
pub mod requester;
pub mod resolver;
pub mod response;
pub mod return_value;
pub mod route_table;
pub mod validation;

pub use classify::PacketClassifier;
pub use components::{ComponentRegistry, ControllerRegistry};
pub use config::DispatcherConfig;
pub use convert::{ConversionError, FromHeaderValue};
pub use dispatcher::{Dispatched, PacketDispatcher, PacketDispatcherBuilder};
pub use error::{ClassifyError, DispatchError, RegistrationError, SlotError};
pub use handler::{
    Arguments, HandlerMethod, HandlerReturn, MethodParameter, PacketController, ParameterKind,
    PACKET_HANDLER_MARKER,
};
pub use handlers::HandlerRegistry;
pub use message::{
    CallContext, HeaderValue, InboundMessage, MessageHeaders, RawPacket, CONTENT_KIND_HEADER,
    DESTINATION_HEADER, PACKET_REQUESTER_HEADER, TARGET_CMD_HEADER, TARGET_GROUP_HEADER,
};
pub use middleware::build_dispatch_pipeline;
pub use requester::{PacketRequester, PacketSender};
pub use resolver::{ArgumentResolver, ArgumentResolverChain};
pub use response::{
    response_slot, OutboundPacket, ResponseOutcome, ResponseReceiver, ResponseSlot,
    ResponseStream,
};
pub use return_value::ReturnValueHandler;
pub use route_table::{HandlerRegistration, RouteMatch, RouteTable};
pub use validation::{FnValidator, ValidationResult, Validator};

// ---------------------------------------------------------------------------
// Integration tests
// ---------------------------------------------------------------------------
