//! Typed errors for unexpected status codes.
//!
//! Error types are plain identifiers mapped to factories in an
//! [`ErrorRegistry`] populated ahead of time. A factory that is missing or
//! refuses the response body never hides the failure: the generic
//! [`GENERIC_ERROR_TYPE`] is built instead, with the construction failure kept
//! in [`ServiceError::suppressed`].

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::descriptor::EndpointDescriptor;
use crate::serializer::{Encoding, Serializer};
use crate::wire::{content_type, media_type_is, RequestSnapshot, ResponseHead, APPLICATION_OCTET_STREAM};

/// Error type used when nothing more specific can be built.
pub const GENERIC_ERROR_TYPE: &str = "HttpResponseError";

// ---------------------------------------------------------------------------
// RawResponse
// ---------------------------------------------------------------------------

/// Fully buffered response carried by a [`ServiceError`].
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub request: RequestSnapshot,
    pub body: Bytes,
}

impl RawResponse {
    /// Joins a response head with its fully read body.
    #[must_use]
    pub fn new(head: ResponseHead, body: Bytes) -> Self {
        Self {
            status: head.status,
            headers: head.headers,
            request: head.request,
            body,
        }
    }

    /// Response `Content-Type`, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        content_type(&self.headers)
    }
}

// ---------------------------------------------------------------------------
// ServiceError
// ---------------------------------------------------------------------------

/// Why a registered factory could not build its error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstructionError {
    #[error("no factory registered for error type {0:?}")]
    Unregistered(String),
    #[error("error type {error_type} requires a {expected} body")]
    BodyMismatch {
        error_type: String,
        expected: &'static str,
    },
    #[error("{0}")]
    Custom(String),
}

/// Materialized error for a response whose status was not expected.
#[derive(Debug, Clone)]
pub struct ServiceError {
    pub error_type: String,
    pub message: String,
    pub response: RawResponse,
    /// Decoded body, when it could be decoded.
    pub value: Option<Value>,
    /// Failures hit while trying to build a more specific error type.
    pub suppressed: Vec<ConstructionError>,
}

impl ServiceError {
    /// An error of `error_type` with no suppressed failures.
    #[must_use]
    pub fn new(error_type: &str, message: &str, response: &RawResponse, value: Option<&Value>) -> Self {
        Self {
            error_type: error_type.to_owned(),
            message: message.to_owned(),
            response: response.clone(),
            value: value.cloned(),
            suppressed: Vec::new(),
        }
    }

    /// Status code of the failed response.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.response.status
    }

    /// Whether this error was materialized as `error_type`.
    #[must_use]
    pub fn is(&self, error_type: &str) -> bool {
        self.error_type == error_type
    }

    /// Deserializes the decoded body into a caller-defined error model.
    ///
    /// # Errors
    ///
    /// Fails if there is no decoded body or it does not match `T`.
    pub fn value_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.value.clone().unwrap_or(Value::Null))
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

impl std::error::Error for ServiceError {}

// ---------------------------------------------------------------------------
// ErrorRegistry
// ---------------------------------------------------------------------------

/// Builds one error type from `(message, response, decoded body)`.
pub type ErrorFactory =
    Arc<dyn Fn(&str, &RawResponse, Option<&Value>) -> Result<ServiceError, ConstructionError> + Send + Sync>;

/// Error type identifier -> factory.
pub struct ErrorRegistry {
    factories: DashMap<String, ErrorFactory>,
}

impl ErrorRegistry {
    /// Registry knowing only the generic error type.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self {
            factories: DashMap::new(),
        };
        registry.register_any(GENERIC_ERROR_TYPE);
        registry
    }

    /// Registers `factory` for `error_type`, replacing any earlier one.
    pub fn register(&self, error_type: &str, factory: ErrorFactory) {
        self.factories.insert(error_type.to_owned(), factory);
    }

    /// Registers `error_type` accepting any body, or none.
    pub fn register_any(&self, error_type: &str) {
        let name = error_type.to_owned();
        self.register(
            error_type,
            Arc::new(move |message: &str, response: &RawResponse, value: Option<&Value>| {
                Ok(ServiceError::new(&name, message, response, value))
            }),
        );
    }

    /// Registers `error_type` requiring a JSON object body.
    pub fn register_json_object(&self, error_type: &str) {
        let name = error_type.to_owned();
        self.register(
            error_type,
            Arc::new(move |message: &str, response: &RawResponse, value: Option<&Value>| match value {
                Some(v @ Value::Object(_)) => Ok(ServiceError::new(&name, message, response, Some(v))),
                _ => Err(ConstructionError::BodyMismatch {
                    error_type: name.clone(),
                    expected: "JSON object",
                }),
            }),
        );
    }

    /// Whether a factory is registered for `error_type`.
    #[must_use]
    pub fn contains(&self, error_type: &str) -> bool {
        self.factories.contains_key(error_type)
    }

    /// Builds the error for an unexpected status.
    ///
    /// Never fails: a missing or failing factory degrades to
    /// [`GENERIC_ERROR_TYPE`] with the cause recorded in `suppressed`.
    #[must_use]
    pub fn materialize(
        &self,
        response: &RawResponse,
        value: Option<&Value>,
        descriptor: &EndpointDescriptor,
    ) -> ServiceError {
        let error_type = descriptor.exceptions.error_type_for(response.status);
        let message = status_message(response.status, response.content_type(), &response.body);

        let factory = self.factories.get(error_type).map(|entry| Arc::clone(entry.value()));
        let failure = match factory {
            Some(factory) => match factory(&message, response, value) {
                Ok(err) => return err,
                Err(cause) => cause,
            },
            None => ConstructionError::Unregistered(error_type.to_owned()),
        };

        tracing::warn!(
            operation = %descriptor.id,
            error_type,
            cause = %failure,
            "falling back to generic error type"
        );
        let mut err = ServiceError::new(GENERIC_ERROR_TYPE, &message, response, value);
        err.suppressed.push(failure);
        err
    }
}

impl Default for ErrorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for ErrorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        types.sort();
        f.debug_struct("ErrorRegistry").field("types", &types).finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `"Status code {code}, "` followed by a short rendering of the body.
#[must_use]
pub fn status_message(status: StatusCode, content_type: Option<&str>, body: &[u8]) -> String {
    let rendered = if body.is_empty() {
        "(empty body)".to_owned()
    } else if content_type.is_some_and(|ct| media_type_is(ct, APPLICATION_OCTET_STREAM)) {
        format!("({}-byte body)", body.len())
    } else {
        format!("\"{}\"", String::from_utf8_lossy(body))
    };
    format!("Status code {}, {rendered}", status.as_u16())
}

/// Best-effort decode of an error body. Undecodable bodies yield `None`.
#[must_use]
pub fn decode_error_body(serializer: &dyn Serializer, response: &RawResponse) -> Option<Value> {
    let ct = response.content_type();
    if response.body.is_empty() || ct.is_some_and(|ct| media_type_is(ct, APPLICATION_OCTET_STREAM)) {
        return None;
    }
    match serializer.deserialize(&response.body, Encoding::from_content_type(ct)) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(error = %err, status = response.status.as_u16(), "error body is not decodable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use http::header::CONTENT_TYPE;
    use http::{HeaderValue, Method};
    use serde_json::json;

    use super::*;
    use crate::descriptor::build_interface;
    use crate::metadata::{InterfaceMetadata, OperationMetadata};
    use crate::serializer::JsonSerializer;

    fn descriptor() -> EndpointDescriptor {
        build_interface(
            &InterfaceMetadata::new("Items", "https://example.com").operation(
                OperationMetadata::new("getItem")
                    .get("/items/{id}")
                    .path_param("id", 0)
                    .expect(&[200])
                    .error_on(404, "NotFoundError")
                    .error_on(409, "ConflictError"),
            ),
        )
        .unwrap()
        .remove(0)
    }

    fn response(status: u16, ct: &str, body: &'static [u8]) -> RawResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            request: RequestSnapshot {
                method: Method::GET,
                url: "https://example.com/items/1".into(),
                headers: HeaderMap::new(),
            },
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn message_formats() {
        assert_eq!(
            status_message(StatusCode::NOT_FOUND, None, b""),
            "Status code 404, (empty body)"
        );
        assert_eq!(
            status_message(StatusCode::BAD_REQUEST, Some(APPLICATION_OCTET_STREAM), b"\x00\x01\x02"),
            "Status code 400, (3-byte body)"
        );
        assert_eq!(
            status_message(StatusCode::CONFLICT, Some("application/json"), br#"{"a":1}"#),
            r#"Status code 409, "{"a":1}""#
        );
    }

    #[test]
    fn not_found_carries_decoded_body_and_raw_response() {
        let registry = ErrorRegistry::with_defaults();
        registry.register_json_object("NotFoundError");
        let raw = response(404, "application/json", br#"{"code":"ItemNotFound"}"#);
        let value = decode_error_body(&JsonSerializer, &raw);
        let err = registry.materialize(&raw, value.as_ref(), &descriptor());
        assert!(err.is("NotFoundError"));
        assert_eq!(err.value, Some(json!({"code": "ItemNotFound"})));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.response.body, Bytes::from_static(br#"{"code":"ItemNotFound"}"#));
        assert!(err.suppressed.is_empty());
    }

    #[test]
    fn unregistered_type_falls_back_to_generic() {
        let registry = ErrorRegistry::with_defaults();
        let raw = response(409, "application/json", b"{}");
        let err = registry.materialize(&raw, None, &descriptor());
        assert!(err.is(GENERIC_ERROR_TYPE));
        assert_eq!(
            err.suppressed,
            vec![ConstructionError::Unregistered("ConflictError".into())]
        );
        assert!(err.message.starts_with("Status code 409"));
    }

    #[test]
    fn body_mismatch_falls_back_with_cause() {
        let registry = ErrorRegistry::with_defaults();
        registry.register_json_object("NotFoundError");
        let raw = response(404, "text/plain", b"gone");
        let value = decode_error_body(&JsonSerializer, &raw);
        assert_eq!(value, Some(json!("gone")));
        let err = registry.materialize(&raw, value.as_ref(), &descriptor());
        assert!(err.is(GENERIC_ERROR_TYPE));
        assert!(matches!(err.suppressed[0], ConstructionError::BodyMismatch { .. }));
        assert_eq!(err.value, Some(json!("gone")));
    }

    #[test]
    fn unmapped_status_uses_default_type() {
        let registry = ErrorRegistry::with_defaults();
        let raw = response(500, "application/json", b"");
        let err = registry.materialize(&raw, None, &descriptor());
        assert!(err.is(GENERIC_ERROR_TYPE));
        assert!(err.suppressed.is_empty());
        assert_eq!(err.message, "Status code 500, (empty body)");
    }

    #[test]
    fn malformed_error_body_is_not_decoded() {
        let raw = response(404, "application/json", b"{not json");
        assert_eq!(decode_error_body(&JsonSerializer, &raw), None);
    }

    #[test]
    fn typed_error_model() {
        #[derive(serde::Deserialize)]
        struct Detail {
            code: String,
        }
        let registry = ErrorRegistry::with_defaults();
        registry.register_json_object("NotFoundError");
        let raw = response(404, "application/json", br#"{"code":"Gone"}"#);
        let value = decode_error_body(&JsonSerializer, &raw);
        let err = registry.materialize(&raw, value.as_ref(), &descriptor());
        assert_eq!(err.value_as::<Detail>().unwrap().code, "Gone");
    }
}
