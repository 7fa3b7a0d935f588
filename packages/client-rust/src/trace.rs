//! `tracing`-backed implementation of the [`Tracer`] collaborator.

use http::StatusCode;
use tracing::{info_span, Span};

use crate::context::InvocationContext;
use crate::error::InvokeError;
use crate::traits::Tracer;

/// Span handle for one call.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub name: String,
    pub span: Span,
}

impl TraceContext {
    /// A context that records nothing.
    #[must_use]
    pub fn disabled(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            span: Span::none(),
        }
    }

    pub fn record_status(&self, status: StatusCode) {
        self.span.record("status", status.as_u16());
    }
}

/// Opens one `rest_call` span per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanTracer;

impl Tracer for SpanTracer {
    fn start(&self, span_name: &str, ctx: &InvocationContext) -> TraceContext {
        let span = info_span!(
            "rest_call",
            operation = span_name,
            request_id = %ctx.request_id,
            status = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        TraceContext {
            name: span_name.to_owned(),
            span,
        }
    }

    fn end(&self, trace: &TraceContext, error: Option<&InvokeError>) {
        match error {
            None => {
                trace.span.record("outcome", "ok");
            }
            Some(err) => {
                trace.span.record("outcome", err.kind());
                trace.span.in_scope(|| {
                    tracing::warn!(operation = %trace.name, error = %err, "call failed");
                });
            }
        }
    }
}
