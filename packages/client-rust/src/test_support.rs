//! Shared fixtures for executor and pipeline tests.

use std::sync::Arc;

use wirebind_core::{
    DescriptorCache, EndpointDescriptor, InterfaceMetadata, JsonSerializer, OperationMetadata,
    ReturnType,
};

use crate::config::ClientConfig;
use crate::invoke::Invoker;
use crate::trace::SpanTracer;
use crate::transport::ScriptedTransport;

/// `Items` interface: `{endpoint}` host, argument 0 is always the endpoint.
pub(crate) fn items(op: OperationMetadata) -> InterfaceMetadata {
    InterfaceMetadata::new("Items", "{endpoint}").operation(op.host_param("endpoint", 0))
}

pub(crate) fn descriptor(op: OperationMetadata) -> Arc<EndpointDescriptor> {
    let name = op.name.clone();
    DescriptorCache::new(16)
        .get_or_build(&items(op), &name)
        .unwrap()
}

/// `GET /items/{id}` returning a JSON object, 404 mapped to `NotFoundError`.
pub(crate) fn get_item() -> Arc<EndpointDescriptor> {
    descriptor(
        OperationMetadata::new("getItem")
            .get("/items/{id}")
            .path_param("id", 1)
            .expect(&[200])
            .error_on(404, "NotFoundError")
            .returns(ReturnType::object()),
    )
}

pub(crate) fn invoker_with(transport: &Arc<ScriptedTransport>, config: ClientConfig) -> Arc<Invoker> {
    let invoker = Invoker::new(
        Arc::clone(transport) as Arc<dyn crate::traits::HttpTransport>,
        Arc::new(JsonSerializer),
        Arc::new(SpanTracer),
        config,
    );
    invoker.errors.register_json_object("NotFoundError");
    Arc::new(invoker)
}

pub(crate) fn invoker(transport: &Arc<ScriptedTransport>) -> Arc<Invoker> {
    invoker_with(transport, ClientConfig::default())
}
