//! Pipeline composition: wraps the invoker with the middleware layers.

use std::sync::Arc;

use tower::ServiceBuilder;
use wirebind_core::Decoded;

use super::metrics::MetricsLayer;
use crate::error::InvokeError;
use crate::invoke::Invoker;
use crate::service::{Invocation, InvokerService};

/// Builds the invocation pipeline around `invoker`: [`MetricsLayer`] over
/// [`InvokerService`]. Cancellation stays with the invocation's context.
#[must_use]
pub fn build_invocation_pipeline(
    invoker: Arc<Invoker>,
) -> impl tower::Service<Invocation, Response = Decoded, Error = InvokeError, Future: Send> + Clone {
    ServiceBuilder::new()
        .layer(MetricsLayer)
        .service(InvokerService::new(invoker))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::context::InvocationContext;
    use crate::test_support::{get_item, invoker};
    use crate::transport::{ScriptedResponse, ScriptedTransport};

    #[tokio::test]
    async fn pipeline_routes_through_all_layers() {
        let transport = Arc::new(ScriptedTransport::new([ScriptedResponse::json(
            200,
            r#"{"id":"42"}"#,
        )]));
        let svc = build_invocation_pipeline(invoker(&transport));
        let invocation = Invocation::new(get_item(), vec!["http://localhost".into(), "42".into()]);

        let decoded = svc.oneshot(invocation).await.unwrap();
        assert_eq!(decoded.as_json().unwrap()["id"], "42");
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn pipeline_cancellation_follows_the_context() {
        let transport = Arc::new(ScriptedTransport::new([ScriptedResponse::hanging()]));
        let ctx = InvocationContext::new();
        let token = ctx.cancellation.clone();
        let invocation = Invocation::new(get_item(), vec!["http://localhost".into(), "7".into()])
            .with_context(ctx);
        let svc = build_invocation_pipeline(invoker(&transport));

        let call = tokio::spawn(svc.oneshot(invocation));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        token.cancel();

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, InvokeError::Cancelled));
        assert!(transport.send_aborted());
    }
}
