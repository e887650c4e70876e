//! Error taxonomy for classification, registration and dispatch.

use std::sync::Arc;

use packetmap_core::{CodecError, Direction, RouteCondition, RouteKey, RouteParseError};

/// Per-message dispatch failures.
///
/// Cloneable so the same failure can be returned to the caller and written
/// into the message's response slot.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("no handler for {direction} destination {destination}")]
    NoRouteFound {
        destination: RouteKey,
        direction: Direction,
    },
    #[error("could not resolve parameter {index} ('{name}') of {method}: no suitable resolver")]
    UnsupportedParameter {
        method: String,
        index: usize,
        name: &'static str,
    },
    #[error("could not resolve argument '{name}' of {method}: {reason}")]
    ArgumentResolution {
        method: String,
        name: &'static str,
        reason: String,
    },
    #[error("validation failed for '{name}' of {method}: {}", .errors.join("; "))]
    ValidationFailed {
        method: String,
        name: &'static str,
        errors: Vec<String>,
    },
    #[error(transparent)]
    NoCodecAvailable(CodecError),
    #[error("handler {method} failed: {cause}")]
    HandlerFailed {
        method: String,
        cause: Arc<anyhow::Error>,
    },
    #[error("dispatch timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("dispatcher overloaded, try again later")]
    Overloaded,
    #[error("dispatch cancelled")]
    Cancelled,
    #[error("response stream failed: {0}")]
    Response(String),
}

impl DispatchError {
    /// Short label used for metrics and log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoRouteFound { .. } => "no_route",
            Self::UnsupportedParameter { .. } => "unsupported_parameter",
            Self::ArgumentResolution { .. } => "argument_resolution",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::NoCodecAvailable(_) => "no_codec",
            Self::HandlerFailed { .. } => "handler_failed",
            Self::Timeout { .. } => "timeout",
            Self::Overloaded => "overloaded",
            Self::Cancelled => "cancelled",
            Self::Response(_) => "response",
        }
    }
}

impl From<CodecError> for DispatchError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::NoEncoder { .. } | CodecError::NoDecoder { .. } => {
                Self::NoCodecAvailable(err)
            }
            CodecError::Encode { .. } | CodecError::Decode { .. } => {
                Self::Response(err.to_string())
            }
        }
    }
}

/// Route table build failures. The previously published table stays active.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistrationError {
    #[error("ambiguous route {condition}: {existing} and {conflicting} would always tie")]
    AmbiguousRoute {
        condition: RouteCondition,
        existing: String,
        conflicting: String,
    },
}

/// Misuse of a single-assignment response slot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("response for call {call_id} was already completed")]
    AlreadyCompleted { call_id: u64 },
    #[error("response slot dropped without a response")]
    Abandoned,
}

/// Raw packets that cannot become dispatchable messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("packet has no destination header")]
    MissingDestination,
    #[error("invalid destination '{raw}': {reason}")]
    InvalidDestination { raw: String, reason: String },
}

impl ClassifyError {
    pub(crate) fn invalid(raw: impl Into<String>, err: &RouteParseError) -> Self {
        Self::InvalidDestination {
            raw: raw.into(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_failures_map_to_no_codec() {
        let err: DispatchError = CodecError::NoEncoder {
            type_name: "u8".into(),
            kind: packetmap_core::ContentKind::JSON,
        }
        .into();
        assert!(matches!(err, DispatchError::NoCodecAvailable(_)));
        assert_eq!(err.kind(), "no_codec");
    }

    #[test]
    fn transcoding_failures_map_to_response() {
        let err: DispatchError = CodecError::Decode {
            type_name: "u8".into(),
            reason: "bad".into(),
        }
        .into();
        assert!(matches!(err, DispatchError::Response(_)));
    }

    #[test]
    fn validation_message_joins_errors() {
        let err = DispatchError::ValidationFailed {
            method: "Login::enter".into(),
            name: "request",
            errors: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            err.to_string(),
            "validation failed for 'request' of Login::enter: a; b"
        );
    }
}
