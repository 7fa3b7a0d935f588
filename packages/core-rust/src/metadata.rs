//! Declarative operation metadata, as supplied by hand-written or generated
//! service definitions.
//!
//! Metadata is plain data; [`crate::descriptor`] validates it and compiles it
//! into an immutable [`crate::descriptor::EndpointDescriptor`].

use http::Method;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Where one call argument goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamRole {
    /// Fills `{name}` in the host template.
    Host { name: String, encoded: bool },
    /// Fills `{name}` in the path template.
    Path { name: String, encoded: bool },
    /// Adds query parameter `name`; `multiple` expands list values into
    /// repeated parameters.
    Query {
        name: String,
        encoded: bool,
        multiple: bool,
    },
    /// Sets header `name`; a map argument expands to one header per key,
    /// each prefixed with `name`.
    Header { name: String },
    /// The request body, with an optional explicit content type.
    Body { content_type: Option<String> },
    /// Adds form field `name`; a map argument contributes its entries directly.
    Form { name: String, encoded: bool },
    /// Carries call context only; never placed on the wire.
    Context,
}

/// Binds argument `index` to a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamMetadata {
    pub index: usize,
    pub role: ParamRole,
}

// ---------------------------------------------------------------------------
// Return types
// ---------------------------------------------------------------------------

/// Innermost body type after every wrapper is unwrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyType {
    /// No body expected; the response is drained.
    #[default]
    Unit,
    /// `true` iff the status is 2xx (HEAD requests).
    Bool,
    /// Whole body as bytes.
    Bytes,
    /// Live, unconsumed body.
    ByteStream,
    /// Lazy view over the body.
    Binary,
    /// Deserialized JSON value.
    Object,
    /// Deserialized page of items with a continuation token.
    Page,
}

/// Wire representation differing from the declared return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    /// Body carries a base64url string (padding optional) that decodes to bytes.
    Base64Url,
}

/// Declared return type, as a tree of wrappers around a [`BodyType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    Body(BodyType),
    /// Completed asynchronously.
    Async(Box<ReturnType>),
    /// Wrapped in a result envelope built by the factory registered for `kind`.
    Envelope {
        kind: String,
        headers_type: Option<String>,
        inner: Box<ReturnType>,
    },
    /// Wrapped in a paged envelope.
    Paged(Box<ReturnType>),
}

impl ReturnType {
    /// No response body.
    #[must_use]
    pub fn unit() -> Self {
        Self::Body(BodyType::Unit)
    }

    /// A body deserialized into a structured value.
    #[must_use]
    pub fn object() -> Self {
        Self::Body(BodyType::Object)
    }

    /// Deferred result resolving to `inner`.
    #[must_use]
    pub fn asynchronous(inner: ReturnType) -> Self {
        Self::Async(Box::new(inner))
    }

    /// Plain `Response` envelope around `inner`.
    #[must_use]
    pub fn response(inner: ReturnType) -> Self {
        Self::Envelope {
            kind: crate::envelope::RESPONSE.to_owned(),
            headers_type: None,
            inner: Box::new(inner),
        }
    }

    /// `ResponseBase` envelope carrying decoded headers of `headers_type`.
    #[must_use]
    pub fn response_with_headers(headers_type: &str, inner: ReturnType) -> Self {
        Self::Envelope {
            kind: crate::envelope::RESPONSE_BASE.to_owned(),
            headers_type: Some(headers_type.to_owned()),
            inner: Box::new(inner),
        }
    }

    /// `StreamResponse` envelope around the live body.
    #[must_use]
    pub fn stream_response() -> Self {
        Self::Envelope {
            kind: crate::envelope::STREAM_RESPONSE.to_owned(),
            headers_type: None,
            inner: Box::new(Self::Body(BodyType::ByteStream)),
        }
    }

    /// Paged envelope around a page body.
    #[must_use]
    pub fn paged() -> Self {
        Self::Paged(Box::new(Self::Body(BodyType::Page)))
    }
}

impl Default for ReturnType {
    fn default() -> Self {
        Self::unit()
    }
}

/// Field names a page body must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContract {
    pub items_name: String,
    pub next_link_name: String,
}

impl Default for PageContract {
    fn default() -> Self {
        Self {
            items_name: "value".to_owned(),
            next_link_name: "nextLink".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Operations and interfaces
// ---------------------------------------------------------------------------

/// Maps a status code (or, with `status: None`, every unmapped code) to an
/// error type registered in [`crate::error::ErrorRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionMetadata {
    pub status: Option<u16>,
    pub error_type: String,
}

/// Everything declared about one operation.
#[derive(Debug, Clone, Default)]
pub struct OperationMetadata {
    pub name: String,
    /// Declared verbs with their path templates; exactly one is required.
    pub verbs: Vec<(Method, String)>,
    pub params: Vec<ParamMetadata>,
    /// Empty means "any status below 400".
    pub expected_status: Vec<u16>,
    pub exceptions: Vec<ExceptionMetadata>,
    pub return_type: ReturnType,
    pub return_wire_type: Option<WireType>,
    pub static_headers: Vec<(String, String)>,
    pub page: PageContract,
}

impl OperationMetadata {
    /// Metadata for the operation called `name`, with nothing declared yet.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    /// Declares the HTTP method and path template.
    #[must_use]
    pub fn verb(mut self, method: Method, path: &str) -> Self {
        self.verbs.push((method, path.to_owned()));
        self
    }

    /// Shorthand for `verb(Method::GET, path)`.
    #[must_use]
    pub fn get(self, path: &str) -> Self {
        self.verb(Method::GET, path)
    }

    /// Shorthand for `verb(Method::PUT, path)`.
    #[must_use]
    pub fn put(self, path: &str) -> Self {
        self.verb(Method::PUT, path)
    }

    /// Shorthand for `verb(Method::POST, path)`.
    #[must_use]
    pub fn post(self, path: &str) -> Self {
        self.verb(Method::POST, path)
    }

    /// Shorthand for `verb(Method::PATCH, path)`.
    #[must_use]
    pub fn patch(self, path: &str) -> Self {
        self.verb(Method::PATCH, path)
    }

    /// Shorthand for `verb(Method::DELETE, path)`.
    #[must_use]
    pub fn delete(self, path: &str) -> Self {
        self.verb(Method::DELETE, path)
    }

    /// Shorthand for `verb(Method::HEAD, path)`.
    #[must_use]
    pub fn head(self, path: &str) -> Self {
        self.verb(Method::HEAD, path)
    }

    /// Binds argument `index` to `role`.
    #[must_use]
    pub fn param(mut self, index: usize, role: ParamRole) -> Self {
        self.params.push(ParamMetadata { index, role });
        self
    }

    /// Host placeholder filled verbatim from argument `index`.
    #[must_use]
    pub fn host_param(self, name: &str, index: usize) -> Self {
        self.param(
            index,
            ParamRole::Host {
                name: name.to_owned(),
                encoded: false,
            },
        )
    }

    /// Path parameter whose value is percent-escaped.
    #[must_use]
    pub fn path_param(self, name: &str, index: usize) -> Self {
        self.param(
            index,
            ParamRole::Path {
                name: name.to_owned(),
                encoded: true,
            },
        )
    }

    /// Path parameter inserted verbatim (already encoded, or a full URL).
    #[must_use]
    pub fn raw_path_param(self, name: &str, index: usize) -> Self {
        self.param(
            index,
            ParamRole::Path {
                name: name.to_owned(),
                encoded: false,
            },
        )
    }

    /// Query parameter whose value is percent-escaped.
    #[must_use]
    pub fn query_param(self, name: &str, index: usize) -> Self {
        self.param(
            index,
            ParamRole::Query {
                name: name.to_owned(),
                encoded: true,
                multiple: false,
            },
        )
    }

    /// Query parameter repeated once per list element.
    #[must_use]
    pub fn multi_query_param(self, name: &str, index: usize) -> Self {
        self.param(
            index,
            ParamRole::Query {
                name: name.to_owned(),
                encoded: true,
                multiple: true,
            },
        )
    }

    /// Header parameter. A map argument expands into one header per entry,
    /// with `name` as the prefix.
    #[must_use]
    pub fn header_param(self, name: &str, index: usize) -> Self {
        self.param(
            index,
            ParamRole::Header {
                name: name.to_owned(),
            },
        )
    }

    /// Request body argument, with an optional explicit content type.
    #[must_use]
    pub fn body_param(self, index: usize, content_type: Option<&str>) -> Self {
        self.param(
            index,
            ParamRole::Body {
                content_type: content_type.map(str::to_owned),
            },
        )
    }

    /// Form field, escaped for `application/x-www-form-urlencoded`.
    #[must_use]
    pub fn form_param(self, name: &str, index: usize) -> Self {
        self.param(
            index,
            ParamRole::Form {
                name: name.to_owned(),
                encoded: true,
            },
        )
    }

    /// Adds to the expected status codes.
    #[must_use]
    pub fn expect(mut self, codes: &[u16]) -> Self {
        self.expected_status.extend_from_slice(codes);
        self
    }

    /// Maps an unexpected `status` to a registered error type.
    #[must_use]
    pub fn error_on(mut self, status: u16, error_type: &str) -> Self {
        self.exceptions.push(ExceptionMetadata {
            status: Some(status),
            error_type: error_type.to_owned(),
        });
        self
    }

    /// Error type for unexpected statuses with no specific mapping.
    #[must_use]
    pub fn default_error(mut self, error_type: &str) -> Self {
        self.exceptions.push(ExceptionMetadata {
            status: None,
            error_type: error_type.to_owned(),
        });
        self
    }

    /// Sets the operation's return type.
    #[must_use]
    pub fn returns(mut self, return_type: ReturnType) -> Self {
        self.return_type = return_type;
        self
    }

    /// Wire representation the body is decoded through before conversion.
    #[must_use]
    pub fn wire_type(mut self, wire_type: WireType) -> Self {
        self.return_wire_type = Some(wire_type);
        self
    }

    /// Header sent with every call of this operation.
    #[must_use]
    pub fn static_header(mut self, name: &str, value: &str) -> Self {
        self.static_headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Overrides the field names a paged response is read from.
    #[must_use]
    pub fn page_contract(mut self, items_name: &str, next_link_name: &str) -> Self {
        self.page = PageContract {
            items_name: items_name.to_owned(),
            next_link_name: next_link_name.to_owned(),
        };
        self
    }
}

/// A service interface: shared host template plus its operations.
#[derive(Debug, Clone, Default)]
pub struct InterfaceMetadata {
    pub service_name: Option<String>,
    pub host: Option<String>,
    pub operations: Vec<OperationMetadata>,
}

impl InterfaceMetadata {
    /// An interface with no operations yet.
    #[must_use]
    pub fn new(service_name: &str, host: &str) -> Self {
        Self {
            service_name: Some(service_name.to_owned()),
            host: Some(host.to_owned()),
            operations: Vec::new(),
        }
    }

    /// Adds an operation.
    #[must_use]
    pub fn operation(mut self, operation: OperationMetadata) -> Self {
        self.operations.push(operation);
        self
    }
}
