//! High-level client: descriptor lookup plus both executors behind one handle.

use std::sync::Arc;

use wirebind_core::{
    Arg, Decoded, DescriptorCache, EndpointDescriptor, EnvelopeRegistry, ErrorRegistry,
    InterfaceMetadata, JsonSerializer, Serializer,
};

use crate::config::ClientConfig;
use crate::context::InvocationContext;
use crate::error::InvokeError;
use crate::invoke::Invoker;
use crate::service::{build_invocation_pipeline, Invocation};
use crate::trace::SpanTracer;
use crate::traits::{HttpTransport, Tracer};

// ---------------------------------------------------------------------------
// RestOperation
// ---------------------------------------------------------------------------

/// A typed operation: its interface metadata, how its input becomes
/// positional arguments, and how the decoded response becomes its output.
pub trait RestOperation {
    type Output;

    /// Operation name as declared in [`Self::interface`].
    const NAME: &'static str;

    fn interface() -> InterfaceMetadata;

    fn into_args(self) -> Vec<Arg>;

    /// # Errors
    ///
    /// Fails if the decoded response does not match [`Self::Output`].
    fn output(decoded: Decoded) -> Result<Self::Output, InvokeError>;
}

// ---------------------------------------------------------------------------
// RestClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum CacheHandle {
    Global,
    Owned(Arc<DescriptorCache>),
}

impl CacheHandle {
    fn get(&self) -> &DescriptorCache {
        match self {
            Self::Global => DescriptorCache::global(),
            Self::Owned(cache) => cache,
        }
    }
}

/// Entry point for calling declared REST operations.
///
/// Cloning is cheap; clones share the invoker, registries and cache.
#[derive(Debug, Clone)]
pub struct RestClient {
    invoker: Arc<Invoker>,
    cache: CacheHandle,
}

impl RestClient {
    /// Starts a builder over `transport`.
    #[must_use]
    pub fn builder(transport: Arc<dyn HttpTransport>) -> RestClientBuilder {
        RestClientBuilder::new(transport)
    }

    /// Validates `interface` and caches all its descriptors.
    ///
    /// # Errors
    ///
    /// Returns the first registration error; nothing is cached in that case.
    pub fn register(
        &self,
        interface: &InterfaceMetadata,
    ) -> Result<Vec<Arc<EndpointDescriptor>>, InvokeError> {
        Ok(self.cache.get().register_interface(interface)?)
    }

    /// # Errors
    ///
    /// Fails if the interface is invalid or does not declare `operation`.
    pub fn descriptor(
        &self,
        interface: &InterfaceMetadata,
        operation: &str,
    ) -> Result<Arc<EndpointDescriptor>, InvokeError> {
        Ok(self.cache.get().get_or_build(interface, operation)?)
    }

    /// Runs `operation` without blocking.
    ///
    /// # Errors
    ///
    /// Any [`InvokeError`].
    pub async fn invoke(
        &self,
        interface: &InterfaceMetadata,
        operation: &str,
        args: Vec<Arg>,
        ctx: InvocationContext,
    ) -> Result<Decoded, InvokeError> {
        let descriptor = self.descriptor(interface, operation)?;
        Arc::clone(&self.invoker).invoke(descriptor, args, ctx).await
    }

    /// Runs `operation` on the calling thread.
    ///
    /// # Errors
    ///
    /// Any [`InvokeError`].
    pub fn invoke_blocking(
        &self,
        interface: &InterfaceMetadata,
        operation: &str,
        args: Vec<Arg>,
        ctx: &InvocationContext,
    ) -> Result<Decoded, InvokeError> {
        let descriptor = self.descriptor(interface, operation)?;
        self.invoker.invoke_blocking(&descriptor, args, ctx)
    }

    /// # Errors
    ///
    /// Any [`InvokeError`], including output conversion failures.
    pub async fn call<O: RestOperation>(
        &self,
        operation: O,
        ctx: InvocationContext,
    ) -> Result<O::Output, InvokeError> {
        let decoded = self
            .invoke(&O::interface(), O::NAME, operation.into_args(), ctx)
            .await?;
        O::output(decoded)
    }

    /// # Errors
    ///
    /// Any [`InvokeError`], including output conversion failures.
    pub fn call_blocking<O: RestOperation>(
        &self,
        operation: O,
        ctx: &InvocationContext,
    ) -> Result<O::Output, InvokeError> {
        let decoded = self.invoke_blocking(&O::interface(), O::NAME, operation.into_args(), ctx)?;
        O::output(decoded)
    }

    /// The invoker wrapped in the metrics layer, for callers that drive
    /// calls as [`Invocation`]s.
    #[must_use]
    pub fn pipeline(
        &self,
    ) -> impl tower::Service<Invocation, Response = Decoded, Error = InvokeError> + Clone {
        build_invocation_pipeline(Arc::clone(&self.invoker))
    }

    /// The shared executor.
    #[must_use]
    pub fn invoker(&self) -> &Arc<Invoker> {
        &self.invoker
    }

    /// Error factories consulted for unexpected statuses.
    #[must_use]
    pub fn errors(&self) -> &ErrorRegistry {
        &self.invoker.errors
    }

    /// Envelope factories used when decoding.
    #[must_use]
    pub fn envelopes(&self) -> &EnvelopeRegistry {
        &self.invoker.envelopes
    }
}

// ---------------------------------------------------------------------------
// RestClientBuilder
// ---------------------------------------------------------------------------

pub struct RestClientBuilder {
    transport: Arc<dyn HttpTransport>,
    serializer: Arc<dyn Serializer>,
    tracer: Arc<dyn Tracer>,
    config: ClientConfig,
    envelopes: Option<Arc<EnvelopeRegistry>>,
    errors: Option<Arc<ErrorRegistry>>,
    global_cache: bool,
}

impl RestClientBuilder {
    /// JSON serializer, span tracer, default config and a private cache.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            serializer: Arc::new(JsonSerializer),
            tracer: Arc::new(SpanTracer),
            config: ClientConfig::default(),
            envelopes: None,
            errors: None,
            global_cache: false,
        }
    }

    /// Replaces the JSON serializer.
    #[must_use]
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Replaces the span tracer.
    #[must_use]
    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Replaces the default configuration.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares an existing envelope registry.
    #[must_use]
    pub fn envelopes(mut self, envelopes: Arc<EnvelopeRegistry>) -> Self {
        self.envelopes = Some(envelopes);
        self
    }

    /// Shares an existing error registry.
    #[must_use]
    pub fn errors(mut self, errors: Arc<ErrorRegistry>) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Shares the process-wide descriptor cache instead of a private one.
    #[must_use]
    pub fn global_cache(mut self) -> Self {
        self.global_cache = true;
        self
    }

    /// Finishes the client. Missing registries get their defaults.
    #[must_use]
    pub fn build(self) -> RestClient {
        let cache = if self.global_cache {
            CacheHandle::Global
        } else {
            CacheHandle::Owned(Arc::new(DescriptorCache::new(
                self.config.descriptor_cache_capacity,
            )))
        };
        let envelopes = self
            .envelopes
            .unwrap_or_else(|| Arc::new(EnvelopeRegistry::with_defaults()));
        let errors = self
            .errors
            .unwrap_or_else(|| Arc::new(ErrorRegistry::with_defaults()));
        let invoker = Invoker::new(self.transport, self.serializer, self.tracer, self.config)
            .with_registries(envelopes, errors);
        RestClient {
            invoker: Arc::new(invoker),
            cache,
        }
    }
}

impl std::fmt::Debug for RestClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClientBuilder")
            .field("config", &self.config)
            .field("global_cache", &self.global_cache)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use wirebind_core::{OperationMetadata, ReturnType};

    use super::*;
    use crate::test_support::items;
    use crate::transport::{ScriptedResponse, ScriptedTransport};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: String,
        name: String,
    }

    struct GetItem {
        id: String,
    }

    impl RestOperation for GetItem {
        type Output = Item;
        const NAME: &'static str = "getItem";

        fn interface() -> InterfaceMetadata {
            items(
                OperationMetadata::new("getItem")
                    .get("/items/{id}")
                    .path_param("id", 1)
                    .expect(&[200])
                    .returns(ReturnType::object()),
            )
        }

        fn into_args(self) -> Vec<Arg> {
            vec!["http://localhost".into(), self.id.into()]
        }

        fn output(decoded: Decoded) -> Result<Item, InvokeError> {
            Ok(decoded.into_json()?)
        }
    }

    fn client(transport: &Arc<ScriptedTransport>) -> RestClient {
        RestClient::builder(Arc::clone(transport) as Arc<dyn HttpTransport>).build()
    }

    #[tokio::test]
    async fn typed_call_decodes_output() {
        let transport = Arc::new(ScriptedTransport::new([ScriptedResponse::json(
            200,
            r#"{"id":"42","name":"widget"}"#,
        )]));
        let item = client(&transport)
            .call(GetItem { id: "42".into() }, InvocationContext::new())
            .await
            .unwrap();
        assert_eq!(
            item,
            Item {
                id: "42".into(),
                name: "widget".into()
            }
        );
    }

    #[test]
    fn typed_blocking_call_decodes_output() {
        let transport = Arc::new(ScriptedTransport::new([ScriptedResponse::json(
            200,
            r#"{"id":"9","name":"gear"}"#,
        )]));
        let item = client(&transport)
            .call_blocking(GetItem { id: "9".into() }, &InvocationContext::new())
            .unwrap();
        assert_eq!(item.name, "gear");
    }

    #[test]
    fn descriptor_lookups_share_one_instance() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = client(&transport);
        let first = client.descriptor(&GetItem::interface(), "getItem").unwrap();
        let second = client.descriptor(&GetItem::interface(), "getItem").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn unknown_operation_is_a_registration_error() {
        let transport = Arc::new(ScriptedTransport::default());
        let err = client(&transport)
            .descriptor(&GetItem::interface(), "deleteItem")
            .unwrap_err();
        assert!(matches!(err, InvokeError::Registration(_)));
    }

    #[tokio::test]
    async fn pipeline_uses_the_client_cache() {
        use tower::ServiceExt;

        let transport = Arc::new(ScriptedTransport::new([ScriptedResponse::json(
            200,
            r#"{"id":"1","name":"bolt"}"#,
        )]));
        let client = client(&transport);
        let descriptor = client.descriptor(&GetItem::interface(), "getItem").unwrap();
        let invocation = Invocation::new(descriptor, GetItem { id: "1".into() }.into_args());

        let decoded = client.pipeline().oneshot(invocation).await.unwrap();
        assert_eq!(GetItem::output(decoded).unwrap().name, "bolt");
    }

    #[test]
    fn clones_share_registries() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = client(&transport);
        client.clone().errors().register_json_object("ConflictError");
        assert!(client.errors().contains("ConflictError"));
    }
}
