//! Tower integration.
//!
//! A call is an [`Invocation`]; [`InvokerService`] executes it with the
//! non-blocking executor, and [`middleware`] wraps it with call metrics:
//!
//! 1. **Invocation**: descriptor, arguments and context for one call
//! 2. **Middleware** (`middleware`): Tower layers (metrics)
//! 3. **Service** ([`InvokerService`]): hands the invocation to the [`Invoker`]

pub mod middleware;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use wirebind_core::{Arg, Decoded, EndpointDescriptor};

use crate::context::InvocationContext;
use crate::error::InvokeError;
use crate::invoke::Invoker;

pub use middleware::build_invocation_pipeline;

/// Boxed future returned by every service in the pipeline.
pub type CallFuture = Pin<Box<dyn Future<Output = Result<Decoded, InvokeError>> + Send>>;

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// One call travelling through the pipeline.
#[derive(Debug)]
pub struct Invocation {
    pub descriptor: Arc<EndpointDescriptor>,
    pub args: Vec<Arg>,
    pub context: InvocationContext,
}

impl Invocation {
    /// A call with a fresh context.
    #[must_use]
    pub fn new(descriptor: Arc<EndpointDescriptor>, args: Vec<Arg>) -> Self {
        Self {
            descriptor,
            args,
            context: InvocationContext::new(),
        }
    }

    /// Replaces the fresh context.
    #[must_use]
    pub fn with_context(mut self, context: InvocationContext) -> Self {
        self.context = context;
        self
    }
}

// ---------------------------------------------------------------------------
// InvokerService
// ---------------------------------------------------------------------------

/// Innermost service: runs the invocation on the non-blocking executor.
#[derive(Debug, Clone)]
pub struct InvokerService {
    invoker: Arc<Invoker>,
}

impl InvokerService {
    /// Wraps `invoker`.
    #[must_use]
    pub fn new(invoker: Arc<Invoker>) -> Self {
        Self { invoker }
    }
}

impl Service<Invocation> for InvokerService {
    type Response = Decoded;
    type Error = InvokeError;
    type Future = CallFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let Invocation {
            descriptor,
            args,
            context,
        } = invocation;
        Box::pin(Arc::clone(&self.invoker).invoke(descriptor, args, context))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::test_support::{get_item, invoker};
    use crate::transport::{ScriptedResponse, ScriptedTransport};

    #[tokio::test]
    async fn invoker_service_executes_the_call() {
        let transport = Arc::new(ScriptedTransport::new([ScriptedResponse::json(
            200,
            r#"{"id":"42"}"#,
        )]));
        let svc = InvokerService::new(invoker(&transport));
        let invocation = Invocation::new(get_item(), vec!["http://localhost".into(), "42".into()]);

        let decoded = svc.oneshot(invocation).await.unwrap();
        assert_eq!(decoded.as_json().unwrap()["id"], "42");
        assert_eq!(transport.requests()[0].url, "http://localhost/items/42");
    }
}
