//! Call executors.
//!
//! [`Invoker`] holds the collaborators and the decision logic shared by both
//! execution models: request preparation, response length checks, the status
//! gate, error materialization and decoding. [`blocking`] and [`nonblocking`]
//! only differ in how they await the transport and where decoding runs.
//!
//! Per call the order is fixed: assemble, send, status gate, decode. Nothing
//! is decoded before the gate passes.

pub mod blocking;
pub mod nonblocking;

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method, StatusCode};
use wirebind_core::error::decode_error_body;
use wirebind_core::{
    assemble, decode, Arg, Decoded, EndpointDescriptor, EnvelopeRegistry, ErrorRegistry,
    HttpRequest, RawResponse, RequestBody, ResponseBody, ResponseHead, Serializer,
};

use crate::config::ClientConfig;
use crate::context::InvocationContext;
use crate::error::InvokeError;
use crate::traits::{HttpTransport, Tracer};

/// Collaborators and configuration for executing calls.
pub struct Invoker {
    pub(crate) transport: Arc<dyn HttpTransport>,
    pub(crate) serializer: Arc<dyn Serializer>,
    pub(crate) envelopes: Arc<EnvelopeRegistry>,
    pub(crate) errors: Arc<ErrorRegistry>,
    pub(crate) tracer: Arc<dyn Tracer>,
    pub(crate) config: ClientConfig,
}

impl Invoker {
    /// An invoker with default envelope and error registries.
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        serializer: Arc<dyn Serializer>,
        tracer: Arc<dyn Tracer>,
        config: ClientConfig,
    ) -> Self {
        Self {
            transport,
            serializer,
            envelopes: Arc::new(EnvelopeRegistry::with_defaults()),
            errors: Arc::new(ErrorRegistry::with_defaults()),
            tracer,
            config,
        }
    }

    /// Swaps in shared registries.
    #[must_use]
    pub fn with_registries(mut self, envelopes: Arc<EnvelopeRegistry>, errors: Arc<ErrorRegistry>) -> Self {
        self.envelopes = envelopes;
        self.errors = errors;
        self
    }

    /// Configuration the invoker was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Assembles the request, stamps the request id, and wraps the body so
    /// its declared length is enforced while the transport reads it.
    pub(crate) fn prepare(
        &self,
        descriptor: &EndpointDescriptor,
        args: Vec<Arg>,
        ctx: &InvocationContext,
    ) -> Result<HttpRequest, InvokeError> {
        let mut request = assemble(
            descriptor,
            args,
            self.serializer.as_ref(),
            &self.config.default_scheme,
        )?;

        if !self.config.request_id_header.is_empty() {
            match HeaderName::from_bytes(self.config.request_id_header.as_bytes()) {
                Ok(name) if !request.headers.contains_key(&name) => {
                    if let Ok(value) = HeaderValue::from_str(&ctx.request_id.to_string()) {
                        request.headers.insert(name, value);
                    }
                }
                Ok(_) => {}
                Err(_) => tracing::warn!(
                    header = %self.config.request_id_header,
                    "request id header name is invalid; not sent"
                ),
            }
        }

        if let Some(expected) = request.content_length() {
            let body = std::mem::replace(&mut request.body, RequestBody::Empty);
            request.body = body.validate_length(expected)?;
        }
        Ok(request)
    }

    /// Applies `Content-Length` validation to a response body when it is
    /// meaningful: never for HEAD requests, 204 or 304 responses.
    pub(crate) fn checked_body(
        &self,
        head: &ResponseHead,
        body: ResponseBody,
    ) -> Result<ResponseBody, InvokeError> {
        let skip = !self.config.validate_response_length
            || head.request.method == Method::HEAD
            || matches!(head.status, StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED);
        match head.content_length() {
            Some(expected) if !skip => Ok(body.validate_length(expected)?),
            _ => Ok(body),
        }
    }

    /// Builds the typed error for a status the descriptor did not expect.
    pub(crate) fn unexpected_status(
        &self,
        head: ResponseHead,
        body: Bytes,
        descriptor: &EndpointDescriptor,
    ) -> InvokeError {
        let raw = RawResponse::new(head, body);
        let value = decode_error_body(self.serializer.as_ref(), &raw);
        self.errors.materialize(&raw, value.as_ref(), descriptor).into()
    }

    pub(crate) fn finish(
        &self,
        head: ResponseHead,
        payload: wirebind_core::Payload,
        descriptor: &EndpointDescriptor,
    ) -> Result<Decoded, InvokeError> {
        Ok(decode(
            head,
            payload,
            descriptor,
            self.serializer.as_ref(),
            &self.envelopes,
        )?)
    }
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("config", &self.config)
            .field("envelopes", &self.envelopes)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
