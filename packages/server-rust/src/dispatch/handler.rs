//! Packet controllers and their handler methods.
//!
//! A controller is a named component that exposes handler methods. Each
//! method carries an optional [`PacketMapping`], an ordered list of
//! [`MethodParameter`] descriptors and a type-erased async body.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, Stream, StreamExt};
use packetmap_core::{PacketMapping, TypeKey, TypedValue};

use super::convert::{ConversionError, FromHeaderValue};
use super::message::{HeaderValue, MessageHeaders};

/// Marker a component must carry to be scanned for handler methods.
pub const PACKET_HANDLER_MARKER: &str = "packet-handler";

// ---------------------------------------------------------------------------
// PacketController trait
// ---------------------------------------------------------------------------

/// A component exposing packet handler methods.
///
/// The `Any` bound enables type-based lookup via
/// [`ControllerRegistry::get`](super::components::ControllerRegistry::get).
pub trait PacketController: Send + Sync + Any {
    /// Unique name; re-registering a controller with the same name replaces it.
    fn name(&self) -> &'static str;

    /// Class-level mapping combined with every method's own mapping.
    fn mapping(&self) -> Option<PacketMapping> {
        None
    }

    /// Markers consulted by [`ComponentRegistry`](super::components::ComponentRegistry)
    /// scans.
    fn markers(&self) -> &'static [&'static str] {
        &[PACKET_HANDLER_MARKER]
    }

    /// The controller's handler methods. Methods without an inbound mapping
    /// are not routable and are skipped at registration.
    fn handler_methods(self: Arc<Self>) -> Vec<HandlerMethod>;

    /// Converts a handler failure into a reply. `None` propagates the error.
    fn handle_exception(&self, _method: &str, _error: &anyhow::Error) -> Option<HandlerReturn> {
        None
    }
}

// ---------------------------------------------------------------------------
// HandlerReturn
// ---------------------------------------------------------------------------

/// What a handler body produces.
pub enum HandlerReturn {
    /// No reply content.
    Empty,
    /// One value, encoded into one reply.
    Single(TypedValue),
    /// Zero or more values, each encoded into its own reply as it arrives.
    /// A stream that ends without yielding means no reply content.
    Stream(BoxStream<'static, anyhow::Result<TypedValue>>),
}

impl HandlerReturn {
    #[must_use]
    pub fn value<T: Any + Send>(value: T) -> Self {
        Self::Single(TypedValue::new(value))
    }

    /// Wraps a fallible stream of concrete values.
    pub fn stream<S, T>(values: S) -> Self
    where
        S: Stream<Item = anyhow::Result<T>> + Send + 'static,
        T: Any + Send,
    {
        Self::Stream(values.map(|item| item.map(TypedValue::new)).boxed())
    }

    /// A stream over already available values.
    pub fn values<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Any + Send,
    {
        Self::stream(futures_util::stream::iter(values.into_iter().map(Ok)))
    }
}

impl fmt::Debug for HandlerReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Single(value) => f.debug_tuple("Single").field(value).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Converts a header value into the parameter's declared type.
pub type HeaderConverter = fn(&HeaderValue) -> Result<TypedValue, ConversionError>;

fn convert<T: FromHeaderValue>(value: &HeaderValue) -> Result<TypedValue, ConversionError> {
    T::from_header_value(value).map(TypedValue::new)
}

/// Where a parameter's value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterKind {
    /// A single header, with an optional fallback value.
    Header {
        name: &'static str,
        default: Option<HeaderValue>,
    },
    /// The whole header map.
    Headers,
    /// A `{name}` capture from the matched route.
    DestinationVariable(&'static str),
    /// The decoded payload.
    Payload,
    /// No source declared; resolved by type (requester, cancellation, custom
    /// resolvers) or, by default, from the payload.
    Plain,
}

/// Describes one handler parameter.
#[derive(Debug, Clone)]
pub struct MethodParameter {
    pub index: usize,
    pub name: &'static str,
    pub ty: TypeKey,
    pub kind: ParameterKind,
    pub required: bool,
    pub validated: bool,
    converter: Option<HeaderConverter>,
}

impl MethodParameter {
    fn with_kind(name: &'static str, ty: TypeKey, kind: ParameterKind) -> Self {
        Self {
            index: 0,
            name,
            ty,
            kind,
            required: true,
            validated: false,
            converter: None,
        }
    }

    /// The decoded payload as a `T`.
    #[must_use]
    pub fn payload<T: Any + Send>(name: &'static str) -> Self {
        Self::with_kind(name, TypeKey::of::<T>(), ParameterKind::Payload)
    }

    /// An un-annotated parameter of type `T`.
    #[must_use]
    pub fn of<T: Any + Send>(name: &'static str) -> Self {
        Self::with_kind(name, TypeKey::of::<T>(), ParameterKind::Plain)
    }

    /// The header `name`, converted to `T`.
    #[must_use]
    pub fn header<T: FromHeaderValue>(name: &'static str) -> Self {
        let mut param = Self::with_kind(
            name,
            TypeKey::of::<T>(),
            ParameterKind::Header {
                name,
                default: None,
            },
        );
        param.converter = Some(convert::<T>);
        param
    }

    /// All headers as [`MessageHeaders`].
    #[must_use]
    pub fn headers(name: &'static str) -> Self {
        Self::with_kind(name, TypeKey::of::<MessageHeaders>(), ParameterKind::Headers)
    }

    /// The destination variable `name`, converted to `T`.
    #[must_use]
    pub fn destination_variable<T: FromHeaderValue>(name: &'static str) -> Self {
        let mut param = Self::with_kind(
            name,
            TypeKey::of::<T>(),
            ParameterKind::DestinationVariable(name),
        );
        param.converter = Some(convert::<T>);
        param
    }

    /// Value used when a header parameter is absent. Implies optional.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<HeaderValue>) -> Self {
        if let ParameterKind::Header { default, .. } = &mut self.kind {
            *default = Some(value.into());
            self.required = false;
        }
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Runs the configured validator on the resolved payload.
    #[must_use]
    pub fn validated(mut self) -> Self {
        self.validated = true;
        self
    }

    /// Converts a raw header value into this parameter's type.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] when no converter exists or conversion
    /// fails.
    pub fn convert(&self, value: &HeaderValue) -> Result<TypedValue, ConversionError> {
        match self.converter {
            Some(converter) => converter(value),
            None if self.ty.is::<HeaderValue>() => Ok(TypedValue::new(value.clone())),
            None => Err(ConversionError {
                from: value.kind(),
                to: self.ty.name(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Resolved arguments handed to a handler body, indexed by parameter position.
pub struct Arguments {
    method: &'static str,
    values: Vec<Option<TypedValue>>,
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("method", &self.method)
            .field("len", &self.values.len())
            .finish_non_exhaustive()
    }
}

impl Arguments {
    #[must_use]
    pub fn new(method: &'static str, values: Vec<Option<TypedValue>>) -> Self {
        Self { method, values }
    }

    /// Takes the argument at `index` as a `T`.
    ///
    /// # Errors
    ///
    /// Fails when the argument is absent, already taken, or not a `T`.
    pub fn take<T: Any>(&mut self, index: usize) -> anyhow::Result<T> {
        self.take_opt(index)?.ok_or_else(|| {
            anyhow::anyhow!("argument {index} of {} is missing", self.method)
        })
    }

    /// Takes an optional argument. Absent yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Fails when the argument is present but not a `T`.
    pub fn take_opt<T: Any>(&mut self, index: usize) -> anyhow::Result<Option<T>> {
        let Some(value) = self.values.get_mut(index).and_then(Option::take) else {
            return Ok(None);
        };
        value.downcast::<T>().map(Some).map_err(|value| {
            anyhow::anyhow!(
                "argument {index} of {} is {}, not {}",
                self.method,
                value.type_key(),
                std::any::type_name::<T>()
            )
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// HandlerMethod
// ---------------------------------------------------------------------------

/// Boxed future returned by a handler body.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<HandlerReturn>>;

type Invoker = Arc<dyn Fn(Arguments) -> HandlerFuture + Send + Sync>;

/// One routable method: mapping, parameters and body.
#[derive(Clone)]
pub struct HandlerMethod {
    name: &'static str,
    mapping: Option<PacketMapping>,
    params: Vec<MethodParameter>,
    invoker: Invoker,
}

impl HandlerMethod {
    /// Creates a method from its async body.
    pub fn new<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<HandlerReturn>> + Send + 'static,
    {
        Self {
            name,
            mapping: None,
            params: Vec::new(),
            invoker: Arc::new(move |args| body(args).boxed()),
        }
    }

    #[must_use]
    pub fn with_mapping(mut self, mapping: PacketMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    /// Appends a parameter; its index is its position.
    #[must_use]
    pub fn with_param(mut self, mut param: MethodParameter) -> Self {
        param.index = self.params.len();
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn mapping(&self) -> Option<&PacketMapping> {
        self.mapping.as_ref()
    }

    #[must_use]
    pub fn params(&self) -> &[MethodParameter] {
        &self.params
    }

    /// Runs the body with resolved arguments.
    #[must_use]
    pub fn invoke(&self, args: Arguments) -> HandlerFuture {
        (self.invoker)(args)
    }
}

impl fmt::Debug for HandlerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("name", &self.name)
            .field("mapping", &self.mapping)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
