//! Tower middleware layers for the invocation pipeline.
//!
//! - [`metrics`]: Call counting and timing via the `metrics` facade
//! - [`pipeline`]: Stacks the layers over the invoker service

pub mod metrics;
pub mod pipeline;

pub use metrics::MetricsLayer;
pub use pipeline::build_invocation_pipeline;
