//! Endpoint descriptors: immutable, per-operation compiled metadata.
//!
//! [`build_interface`] validates an [`InterfaceMetadata`] and compiles every
//! operation into an [`EndpointDescriptor`]. It is all-or-nothing: the first
//! invalid operation aborts the whole interface.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use http::{HeaderName, HeaderValue, Method, StatusCode};

use crate::error::GENERIC_ERROR_TYPE;
use crate::metadata::{
    BodyType, InterfaceMetadata, OperationMetadata, PageContract, ParamRole, ReturnType, WireType,
};
use crate::template::{Template, TemplateError};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Cache key: service name plus operation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId {
    pub interface: String,
    pub operation: String,
}

impl OperationId {
    /// Identifies `operation` within `interface`.
    #[must_use]
    pub fn new(interface: &str, operation: &str) -> Self {
        Self {
            interface: interface.to_owned(),
            operation: operation.to_owned(),
        }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.interface, self.operation)
    }
}

// ---------------------------------------------------------------------------
// Substitutions
// ---------------------------------------------------------------------------

/// Wire location a substitution writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubstitutionKind {
    Host,
    Path,
    Query,
    Header,
    Form,
}

/// Binds one call argument to one templated location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub kind: SubstitutionKind,
    /// Placeholder name for host/path, parameter name for query/form, header
    /// name (or prefix, for map arguments) for headers.
    pub placeholder: String,
    pub argument_index: usize,
    pub should_encode: bool,
    pub merge_multiple: bool,
}

// ---------------------------------------------------------------------------
// Status and exceptions
// ---------------------------------------------------------------------------

/// Status codes treated as success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectedStatus {
    /// Any code below 400.
    Default,
    Codes(BTreeSet<u16>),
}

impl ExpectedStatus {
    /// Whether `status` counts as success.
    #[must_use]
    pub fn contains(&self, status: StatusCode) -> bool {
        match self {
            Self::Default => status.as_u16() < 400,
            Self::Codes(codes) => codes.contains(&status.as_u16()),
        }
    }
}

/// Status code -> error type, with a fallback for unmapped codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionMapping {
    pub by_status: BTreeMap<u16, String>,
    pub default: String,
}

impl ExceptionMapping {
    /// Error type registered for `status`, else the default.
    #[must_use]
    pub fn error_type_for(&self, status: StatusCode) -> &str {
        self.by_status
            .get(&status.as_u16())
            .map_or(self.default.as_str(), String::as_str)
    }
}

impl Default for ExceptionMapping {
    fn default() -> Self {
        Self {
            by_status: BTreeMap::new(),
            default: GENERIC_ERROR_TYPE.to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Return shape
// ---------------------------------------------------------------------------

/// Classification of the declared return type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReturnShape {
    pub is_async: bool,
    pub is_stream_response: bool,
    pub is_void_or_ignored: bool,
    pub is_envelope: bool,
    pub is_paged_envelope: bool,
    /// Factory kind for the envelope, when `is_envelope`.
    pub envelope_kind: Option<String>,
    /// Declared header object type, when the envelope carries decoded headers.
    pub headers_type: Option<String>,
    pub unwrapped_body_type: BodyType,
    /// Body is read fully before decoding (false for live streams and lazy views).
    pub eager_body_read: bool,
    pub headers_eagerly_decoded: bool,
}

impl ReturnShape {
    /// Unwraps async/envelope/paging layers down to the terminal body type.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem for nested envelopes or a paged
    /// envelope whose body is not a page.
    pub fn classify(return_type: &ReturnType) -> Result<Self, String> {
        let mut shape = Self::default();
        let mut current = return_type;
        loop {
            match current {
                ReturnType::Async(inner) => {
                    shape.is_async = true;
                    current = inner;
                }
                ReturnType::Envelope {
                    kind,
                    headers_type,
                    inner,
                } => {
                    if shape.is_envelope {
                        return Err("nested envelopes are not supported".to_owned());
                    }
                    shape.is_envelope = true;
                    shape.envelope_kind = Some(kind.clone());
                    shape.headers_type.clone_from(headers_type);
                    current = inner;
                }
                ReturnType::Paged(inner) => {
                    if shape.is_envelope {
                        return Err("nested envelopes are not supported".to_owned());
                    }
                    shape.is_envelope = true;
                    shape.is_paged_envelope = true;
                    shape.envelope_kind = Some(crate::envelope::PAGED_RESPONSE.to_owned());
                    current = inner;
                }
                ReturnType::Body(body_type) => {
                    shape.unwrapped_body_type = *body_type;
                    break;
                }
            }
        }

        if shape.is_paged_envelope {
            match shape.unwrapped_body_type {
                BodyType::Page => {}
                BodyType::Object => shape.unwrapped_body_type = BodyType::Page,
                other => return Err(format!("paged envelope cannot carry a {other:?} body")),
            }
        }

        let body = shape.unwrapped_body_type;
        shape.is_void_or_ignored = body == BodyType::Unit;
        shape.is_stream_response = shape.is_envelope && body == BodyType::ByteStream;
        shape.eager_body_read = !matches!(body, BodyType::ByteStream | BodyType::Binary);
        shape.headers_eagerly_decoded = shape.headers_type.is_some();
        Ok(shape)
    }
}

// ---------------------------------------------------------------------------
// EndpointDescriptor
// ---------------------------------------------------------------------------

/// Compiled, immutable description of one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDescriptor {
    pub id: OperationId,
    pub http_method: Method,
    pub host_template: Template,
    pub path_template: Template,
    pub substitutions: Vec<Substitution>,
    pub body_argument_index: Option<usize>,
    pub body_content_type: Option<String>,
    pub static_headers: Vec<(HeaderName, HeaderValue)>,
    pub expected_status: ExpectedStatus,
    pub exceptions: ExceptionMapping,
    pub return_shape: ReturnShape,
    pub return_wire_type: Option<WireType>,
    pub page: PageContract,
}

impl EndpointDescriptor {
    /// Whether `status` passes the status gate.
    #[must_use]
    pub fn expects(&self, status: StatusCode) -> bool {
        self.expected_status.contains(status)
    }

    /// Tracing span name, `Service.operation`.
    #[must_use]
    pub fn span_name(&self) -> String {
        self.id.to_string()
    }

    /// Substitutions of one kind, in declaration order.
    pub fn substitutions_of(&self, kind: SubstitutionKind) -> impl Iterator<Item = &Substitution> {
        self.substitutions.iter().filter(move |s| s.kind == kind)
    }
}

// ---------------------------------------------------------------------------
// RegistrationError
// ---------------------------------------------------------------------------

/// Invalid declarative metadata. Fatal for the whole interface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("interface has no service name")]
    MissingServiceName,
    #[error("interface {interface} has no host template")]
    MissingHost { interface: String },
    #[error("operation {operation} declares {found} HTTP verbs; exactly one is required")]
    VerbCount { operation: OperationId, found: usize },
    #[error("operation {operation} binds more than one body parameter")]
    DuplicateBody { operation: OperationId },
    #[error("operation {operation}: {source}")]
    Template {
        operation: OperationId,
        #[source]
        source: TemplateError,
    },
    #[error("operation {operation} declares invalid static header {name:?}")]
    InvalidStaticHeader { operation: OperationId, name: String },
    #[error("operation {operation} has an unsupported return type: {reason}")]
    ReturnType { operation: OperationId, reason: String },
    #[error("operation {operation} is not declared by its interface")]
    UnknownOperation { operation: OperationId },
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Compiles every operation of an interface, or none.
///
/// # Errors
///
/// Returns the first [`RegistrationError`] encountered.
pub fn build_interface(
    interface: &InterfaceMetadata,
) -> Result<Vec<EndpointDescriptor>, RegistrationError> {
    let service = interface
        .service_name
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(RegistrationError::MissingServiceName)?;
    let host = interface
        .host
        .as_deref()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| RegistrationError::MissingHost {
            interface: service.to_owned(),
        })?;

    interface
        .operations
        .iter()
        .map(|op| build(service, host, op))
        .collect()
}

/// Compiles one operation against its interface's service name and host template.
///
/// # Errors
///
/// Returns a [`RegistrationError`] describing the invalid metadata.
pub fn build(
    service: &str,
    host: &str,
    op: &OperationMetadata,
) -> Result<EndpointDescriptor, RegistrationError> {
    let id = OperationId::new(service, &op.name);

    let [(method, path)] = op.verbs.as_slice() else {
        return Err(RegistrationError::VerbCount {
            operation: id,
            found: op.verbs.len(),
        });
    };

    let mut substitutions = Vec::new();
    let mut body_argument_index = None;
    let mut body_content_type = None;
    for param in &op.params {
        let sub = |kind, name: &str, encode, multiple| Substitution {
            kind,
            placeholder: name.to_owned(),
            argument_index: param.index,
            should_encode: encode,
            merge_multiple: multiple,
        };
        match &param.role {
            ParamRole::Host { name, encoded } => {
                substitutions.push(sub(SubstitutionKind::Host, name, *encoded, false));
            }
            ParamRole::Path { name, encoded } => {
                substitutions.push(sub(SubstitutionKind::Path, name, *encoded, false));
            }
            ParamRole::Query {
                name,
                encoded,
                multiple,
            } => substitutions.push(sub(SubstitutionKind::Query, name, *encoded, *multiple)),
            ParamRole::Header { name } => {
                substitutions.push(sub(SubstitutionKind::Header, name, false, false));
            }
            ParamRole::Form { name, encoded } => {
                substitutions.push(sub(SubstitutionKind::Form, name, *encoded, false));
            }
            ParamRole::Body { content_type } => {
                if body_argument_index.replace(param.index).is_some() {
                    return Err(RegistrationError::DuplicateBody { operation: id });
                }
                body_content_type.clone_from(content_type);
            }
            ParamRole::Context => {}
        }
    }

    let template_err = |source| RegistrationError::Template {
        operation: id.clone(),
        source,
    };
    let host_template =
        Template::compile(host, &substitutions, SubstitutionKind::Host).map_err(template_err)?;
    let path_template =
        Template::compile(path, &substitutions, SubstitutionKind::Path).map_err(template_err)?;

    let static_headers = op
        .static_headers
        .iter()
        .map(|(name, value)| {
            let invalid = || RegistrationError::InvalidStaticHeader {
                operation: id.clone(),
                name: name.clone(),
            };
            Ok((
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?,
                HeaderValue::from_str(value).map_err(|_| invalid())?,
            ))
        })
        .collect::<Result<Vec<_>, RegistrationError>>()?;

    let expected_status = if op.expected_status.is_empty() {
        ExpectedStatus::Default
    } else {
        ExpectedStatus::Codes(op.expected_status.iter().copied().collect())
    };

    let mut exceptions = ExceptionMapping::default();
    for mapping in &op.exceptions {
        match mapping.status {
            Some(code) => {
                exceptions.by_status.insert(code, mapping.error_type.clone());
            }
            None => exceptions.default.clone_from(&mapping.error_type),
        }
    }

    let return_shape =
        ReturnShape::classify(&op.return_type).map_err(|reason| RegistrationError::ReturnType {
            operation: id.clone(),
            reason,
        })?;
    if return_shape.unwrapped_body_type == BodyType::Bool && method != Method::HEAD {
        return Err(RegistrationError::ReturnType {
            operation: id,
            reason: "boolean results are only defined for HEAD requests".to_owned(),
        });
    }

    tracing::debug!(
        operation = %id,
        method = %method,
        substitutions = substitutions.len(),
        "built endpoint descriptor"
    );

    Ok(EndpointDescriptor {
        id,
        http_method: method.clone(),
        host_template,
        path_template,
        substitutions,
        body_argument_index,
        body_content_type,
        static_headers,
        expected_status,
        exceptions,
        return_shape,
        return_wire_type: op.return_wire_type,
        page: op.page.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{BodyType, InterfaceMetadata, OperationMetadata, ReturnType};

    fn iface(op: OperationMetadata) -> InterfaceMetadata {
        InterfaceMetadata::new("Items", "https://{account}.example.com").operation(op)
    }

    fn get_item() -> OperationMetadata {
        OperationMetadata::new("getItem")
            .get("/items/{id}")
            .host_param("account", 0)
            .path_param("id", 1)
            .query_param("api-version", 2)
            .header_param("x-trace", 3)
            .expect(&[200])
            .error_on(404, "NotFoundError")
            .returns(ReturnType::object())
    }

    #[test]
    fn builds_descriptor_fields() {
        let d = build_interface(&iface(get_item())).unwrap().remove(0);
        assert_eq!(d.id, OperationId::new("Items", "getItem"));
        assert_eq!(d.http_method, Method::GET);
        assert_eq!(d.substitutions.len(), 4);
        assert_eq!(d.host_template.ranges().len(), 1);
        assert_eq!(d.path_template.ranges().len(), 1);
        assert!(d.expects(StatusCode::OK));
        assert!(!d.expects(StatusCode::CREATED));
        assert_eq!(d.exceptions.error_type_for(StatusCode::NOT_FOUND), "NotFoundError");
        assert_eq!(
            d.exceptions.error_type_for(StatusCode::CONFLICT),
            GENERIC_ERROR_TYPE
        );
        assert_eq!(d.span_name(), "Items.getItem");
    }

    #[test]
    fn default_expected_status_is_below_400() {
        let op = OperationMetadata::new("ping").get("/ping");
        let d = build_interface(&iface(op)).unwrap().remove(0);
        assert_eq!(d.expected_status, ExpectedStatus::Default);
        assert!(d.expects(StatusCode::from_u16(399).unwrap()));
        assert!(!d.expects(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn missing_service_name_is_fatal() {
        let mut i = iface(get_item());
        i.service_name = None;
        assert_eq!(build_interface(&i).unwrap_err(), RegistrationError::MissingServiceName);
    }

    #[test]
    fn missing_host_is_fatal() {
        let mut i = iface(get_item());
        i.host = None;
        assert!(matches!(
            build_interface(&i),
            Err(RegistrationError::MissingHost { .. })
        ));
    }

    #[test]
    fn zero_or_two_verbs_rejected() {
        let none = OperationMetadata::new("nothing");
        assert!(matches!(
            build_interface(&iface(none)),
            Err(RegistrationError::VerbCount { found: 0, .. })
        ));
        let two = OperationMetadata::new("both").get("/a").post("/a");
        assert!(matches!(
            build_interface(&iface(two)),
            Err(RegistrationError::VerbCount { found: 2, .. })
        ));
    }

    #[test]
    fn one_bad_operation_aborts_the_interface() {
        let i = iface(get_item()).operation(OperationMetadata::new("bad"));
        assert!(build_interface(&i).is_err());
    }

    #[test]
    fn duplicate_body_rejected() {
        let op = OperationMetadata::new("put")
            .put("/x")
            .body_param(0, None)
            .body_param(1, None);
        assert!(matches!(
            build_interface(&iface(op)),
            Err(RegistrationError::DuplicateBody { .. })
        ));
    }

    #[test]
    fn unknown_path_placeholder_rejected() {
        let op = OperationMetadata::new("get").get("/items").path_param("id", 0);
        assert!(matches!(
            build_interface(&iface(op)),
            Err(RegistrationError::Template { .. })
        ));
    }

    #[test]
    fn bool_return_requires_head() {
        let op = OperationMetadata::new("exists")
            .get("/x")
            .returns(ReturnType::Body(BodyType::Bool));
        assert!(matches!(
            build_interface(&iface(op)),
            Err(RegistrationError::ReturnType { .. })
        ));
    }

    #[test]
    fn invalid_static_header_rejected() {
        let op = OperationMetadata::new("x").get("/x").static_header("bad header", "v");
        assert!(matches!(
            build_interface(&iface(op)),
            Err(RegistrationError::InvalidStaticHeader { .. })
        ));
    }

    #[test]
    fn classify_unwraps_async_envelope() {
        let shape = ReturnShape::classify(&ReturnType::asynchronous(ReturnType::response(
            ReturnType::object(),
        )))
        .unwrap();
        assert!(shape.is_async);
        assert!(shape.is_envelope);
        assert!(!shape.is_paged_envelope);
        assert_eq!(shape.unwrapped_body_type, BodyType::Object);
        assert!(shape.eager_body_read);
        assert!(!shape.headers_eagerly_decoded);
    }

    #[test]
    fn classify_void() {
        let shape = ReturnShape::classify(&ReturnType::unit()).unwrap();
        assert!(shape.is_void_or_ignored);
        assert!(!shape.is_envelope);
    }

    #[test]
    fn classify_stream_response() {
        let shape = ReturnShape::classify(&ReturnType::stream_response()).unwrap();
        assert!(shape.is_stream_response);
        assert!(!shape.eager_body_read);
    }

    #[test]
    fn classify_paged_normalizes_object_body() {
        let shape =
            ReturnShape::classify(&ReturnType::Paged(Box::new(ReturnType::object()))).unwrap();
        assert!(shape.is_paged_envelope);
        assert_eq!(shape.unwrapped_body_type, BodyType::Page);
    }

    #[test]
    fn classify_rejects_paged_bytes() {
        let rt = ReturnType::Paged(Box::new(ReturnType::Body(BodyType::Bytes)));
        assert!(ReturnShape::classify(&rt).is_err());
    }

    #[test]
    fn classify_headers_envelope() {
        let shape = ReturnShape::classify(&ReturnType::response_with_headers(
            "ItemHeaders",
            ReturnType::object(),
        ))
        .unwrap();
        assert!(shape.headers_eagerly_decoded);
        assert_eq!(shape.headers_type.as_deref(), Some("ItemHeaders"));
    }
}
