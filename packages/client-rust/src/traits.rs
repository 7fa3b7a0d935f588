use async_trait::async_trait;
use wirebind_core::{HttpRequest, HttpResponse};

use crate::context::InvocationContext;
use crate::error::{InvokeError, TransportError};
use crate::trace::TraceContext;

/// Pluggable HTTP transport. Owns connection pooling, retries and redirects.
/// Implementations: `ReqwestTransport`, scripted (tests).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request without blocking the calling task.
    ///
    /// The returned response body is unconsumed. Dropping the future must
    /// abort the in-flight exchange.
    async fn send(
        &self,
        request: HttpRequest,
        ctx: &InvocationContext,
    ) -> Result<HttpResponse, TransportError>;

    /// Sends a request on the calling thread.
    fn send_blocking(
        &self,
        request: HttpRequest,
        ctx: &InvocationContext,
    ) -> Result<HttpResponse, TransportError>;
}

/// Brackets each call in a trace span.
pub trait Tracer: Send + Sync {
    /// Opens the span for one call.
    fn start(&self, span_name: &str, ctx: &InvocationContext) -> TraceContext;

    /// Closes the span, recording the failure if there was one.
    fn end(&self, trace: &TraceContext, error: Option<&InvokeError>);
}
