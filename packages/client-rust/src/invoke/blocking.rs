//! Blocking executor: the whole call runs on the caller's thread.

use wirebind_core::{Arg, Consumption, DecodeStrategy, Decoded, EndpointDescriptor, Payload};

use super::Invoker;
use crate::context::InvocationContext;
use crate::error::InvokeError;
use crate::trace::TraceContext;

impl Invoker {
    /// Executes one call, blocking until the response is decoded.
    ///
    /// Cancellation is checked once before sending; an in-flight blocking
    /// exchange is not interrupted.
    ///
    /// # Errors
    ///
    /// Any [`InvokeError`]; unexpected status codes yield
    /// [`InvokeError::Status`].
    pub fn invoke_blocking(
        &self,
        descriptor: &EndpointDescriptor,
        args: Vec<Arg>,
        ctx: &InvocationContext,
    ) -> Result<Decoded, InvokeError> {
        let trace = self.tracer.start(&descriptor.span_name(), ctx);
        let result = trace
            .span
            .in_scope(|| self.run_blocking(descriptor, args, ctx, &trace));
        self.tracer.end(&trace, result.as_ref().err());
        result
    }

    fn run_blocking(
        &self,
        descriptor: &EndpointDescriptor,
        args: Vec<Arg>,
        ctx: &InvocationContext,
        trace: &TraceContext,
    ) -> Result<Decoded, InvokeError> {
        if ctx.is_cancelled() {
            return Err(InvokeError::Cancelled);
        }
        let request = self.prepare(descriptor, args, ctx)?;
        let response = self.transport.send_blocking(request, ctx)?;
        let (head, body) = response.into_parts();
        trace.record_status(head.status);
        let body = self.checked_body(&head, body)?;

        if !descriptor.expects(head.status) {
            let bytes = body.collect_blocking()?;
            return Err(self.unexpected_status(head, bytes, descriptor));
        }

        let payload = match DecodeStrategy::for_descriptor(descriptor).consumption() {
            Consumption::Drain => {
                body.drain_blocking()?;
                Payload::Drained
            }
            Consumption::Collect => Payload::Bytes(body.collect_blocking()?),
            Consumption::Keep => Payload::Body(body),
        };
        self.finish(head, payload, descriptor)
    }
}
