//! Non-blocking executor.
//!
//! Suspends only on the transport and between body chunks. Buffered decoding
//! is moved to tokio's blocking pool so deserialization never stalls the
//! runtime's I/O workers. Cancelling the context drops the in-flight future,
//! which aborts the exchange and releases its body.

use std::sync::Arc;

use tracing::Instrument;
use wirebind_core::{Arg, Consumption, DecodeStrategy, Decoded, EndpointDescriptor, Payload};

use super::Invoker;
use crate::context::InvocationContext;
use crate::error::InvokeError;
use crate::trace::TraceContext;

impl Invoker {
    /// Executes one call asynchronously.
    ///
    /// # Errors
    ///
    /// Any [`InvokeError`]; cancellation yields [`InvokeError::Cancelled`].
    pub async fn invoke(
        self: Arc<Self>,
        descriptor: Arc<EndpointDescriptor>,
        args: Vec<Arg>,
        ctx: InvocationContext,
    ) -> Result<Decoded, InvokeError> {
        let trace = self.tracer.start(&descriptor.span_name(), &ctx);
        let cancellation = ctx.cancellation.clone();
        let run = Arc::clone(&self)
            .run(descriptor, args, &ctx, &trace)
            .instrument(trace.span.clone());

        let result = tokio::select! {
            biased;
            () = cancellation.cancelled() => Err(InvokeError::Cancelled),
            result = run => result,
        };
        self.tracer.end(&trace, result.as_ref().err());
        result
    }

    async fn run(
        self: Arc<Self>,
        descriptor: Arc<EndpointDescriptor>,
        args: Vec<Arg>,
        ctx: &InvocationContext,
        trace: &TraceContext,
    ) -> Result<Decoded, InvokeError> {
        let request = self.prepare(&descriptor, args, ctx)?;
        let response = self.transport.send(request, ctx).await?;
        let (head, body) = response.into_parts();
        trace.record_status(head.status);
        let body = self.checked_body(&head, body)?;

        if !descriptor.expects(head.status) {
            let bytes = body.collect().await?;
            return Err(self.unexpected_status(head, bytes, &descriptor));
        }

        let payload = match DecodeStrategy::for_descriptor(&descriptor).consumption() {
            Consumption::Drain => {
                body.drain().await?;
                Payload::Drained
            }
            Consumption::Collect => Payload::Bytes(body.collect().await?),
            Consumption::Keep => Payload::Body(body),
        };

        let offload = matches!(payload, Payload::Bytes(_))
            && payload.buffered_len() >= self.config.decode_offload_threshold;
        if !offload {
            return self.finish(head, payload, &descriptor);
        }
        let span = tracing::Span::current();
        tokio::task::spawn_blocking(move || span.in_scope(|| self.finish(head, payload, &descriptor)))
            .await
            .map_err(|err| InvokeError::DecodeTask(err.to_string()))?
    }
}
