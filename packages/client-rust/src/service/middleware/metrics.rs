//! Metrics middleware.
//!
//! Counts calls by operation and outcome and records their duration through
//! the `metrics` facade. Without an installed recorder the macros are no-ops.

use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};
use wirebind_core::Decoded;

use crate::error::InvokeError;
use crate::service::{CallFuture, Invocation};

pub const CALLS_TOTAL: &str = "wirebind_calls_total";
pub const CALL_DURATION_MS: &str = "wirebind_call_duration_ms";

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Records call duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Invocation> for MetricsService<S>
where
    S: Service<Invocation, Response = Decoded, Error = InvokeError> + Send,
    S::Future: Send + 'static,
{
    type Response = Decoded;
    type Error = InvokeError;
    type Future = CallFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let operation = invocation.descriptor.span_name();
        let span = info_span!(
            "call",
            operation = %operation,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(invocation);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(err) => err.kind(),
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                let span = tracing::Span::current();
                span.record("duration_ms", duration_ms);
                span.record("outcome", outcome);

                metrics::counter!(CALLS_TOTAL, "operation" => operation.clone(), "outcome" => outcome)
                    .increment(1);
                metrics::histogram!(CALL_DURATION_MS, "operation" => operation)
                    .record(elapsed.as_secs_f64() * 1000.0);

                tracing::debug!(duration_ms, outcome, "call complete");
                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
