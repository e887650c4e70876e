use packetmap_core::ContentKind;
use serde::{Deserialize, Serialize};

/// Dispatcher-level configuration.
///
/// Controls dispatch timeouts, concurrency limits and payload resolution
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Timeout applied to each dispatch in milliseconds.
    pub default_timeout_ms: u64,
    /// Maximum number of in-flight dispatches before load shedding.
    pub max_concurrent_dispatches: u32,
    /// Content kind used when a packet carries no `contentKind` header.
    pub default_content_kind: ContentKind,
    /// Whether un-annotated handler parameters are decoded from the payload.
    pub payload_default_resolution: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            max_concurrent_dispatches: 1000,
            default_content_kind: ContentKind::ANY,
            payload_default_resolution: true,
        }
    }
}
