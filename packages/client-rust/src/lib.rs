//! Wirebind client: blocking and non-blocking executors over pluggable HTTP
//! transports, with tracing and a tower middleware pipeline.

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod invoke;
pub mod service;
pub mod trace;
pub mod traits;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{RestClient, RestClientBuilder, RestOperation};
pub use config::ClientConfig;
pub use context::InvocationContext;
pub use error::{InvokeError, TransportError};
pub use invoke::Invoker;
pub use service::{build_invocation_pipeline, Invocation, InvokerService};
pub use trace::{SpanTracer, TraceContext};
pub use traits::{HttpTransport, Tracer};
pub use transport::{ReqwestTransport, ScriptedResponse, ScriptedTransport};
