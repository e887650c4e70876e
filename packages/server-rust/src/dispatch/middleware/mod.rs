//! Tower middleware layers for the dispatch pipeline.
//!
//! - [`completion`]: Writes failures into the response slot
//! - [`load_shed`]: Semaphore-based concurrency limiting
//! - [`timeout`]: Per-message timeout enforcement
//! - [`metrics`]: Dispatch timing and outcome via spans and the `metrics` facade
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod completion;
pub mod load_shed;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use completion::CompletionLayer;
pub use load_shed::LoadShedLayer;
pub use metrics::MetricsLayer;
pub use pipeline::build_dispatch_pipeline;
pub use timeout::TimeoutLayer;
