//! Response classification and decoding.
//!
//! [`DecodeStrategy::for_descriptor`] picks how a successful response is
//! turned into a value. Executors consume the body as the strategy's
//! [`Consumption`] dictates, then hand the result to [`decode`], which is
//! shared by the blocking and non-blocking paths.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use bytes::Bytes;
use http::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::body::{BinaryData, ResponseBody};
use crate::descriptor::EndpointDescriptor;
use crate::envelope::{Envelope, EnvelopeParts, EnvelopeRegistry};
use crate::metadata::{BodyType, PageContract, WireType};
use crate::serializer::{Encoding, SerdeError, Serializer};
use crate::wire::ResponseHead;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to deserialize response body: {0}")]
    Serde(#[from] SerdeError),
    #[error("response body violates the page contract: {0}")]
    PageContract(String),
    #[error("invalid base64url payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("response payload was not consumed as {expected}")]
    UnexpectedPayload { expected: &'static str },
    #[error("a {0} result has no JSON representation")]
    NotJson(&'static str),
    #[error("failed to convert result: {0}")]
    Convert(#[source] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// How a successful response becomes a value, in decision order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Void or ignored result: drain and discard.
    Drain,
    /// HEAD with a boolean result: `true` iff 2xx.
    HeadBool,
    /// Whole body as bytes, with the wire-type transform applied.
    RawBytes,
    /// The live body, unconsumed.
    Passthrough,
    /// Lazy [`BinaryData`] view.
    LazyBinary,
    /// Serializer-decoded value or page.
    Deserialize,
}

/// What the executor does with the body before calling [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    Drain,
    Collect,
    Keep,
}

impl DecodeStrategy {
    /// Strategy for the descriptor's unwrapped return type.
    #[must_use]
    pub fn for_descriptor(descriptor: &EndpointDescriptor) -> Self {
        let shape = &descriptor.return_shape;
        if shape.is_void_or_ignored {
            return Self::Drain;
        }
        match shape.unwrapped_body_type {
            BodyType::Bool if descriptor.http_method == Method::HEAD => Self::HeadBool,
            BodyType::Bytes => Self::RawBytes,
            BodyType::ByteStream => Self::Passthrough,
            BodyType::Binary => Self::LazyBinary,
            _ => Self::Deserialize,
        }
    }

    /// How much of the body the strategy needs read before decoding.
    #[must_use]
    pub fn consumption(self) -> Consumption {
        match self {
            Self::Drain | Self::HeadBool => Consumption::Drain,
            Self::RawBytes | Self::Deserialize => Consumption::Collect,
            Self::Passthrough | Self::LazyBinary => Consumption::Keep,
        }
    }
}

/// The body after consumption.
#[derive(Debug)]
pub enum Payload {
    Drained,
    Bytes(Bytes),
    Body(ResponseBody),
}

impl Payload {
    /// Buffered length, for deciding whether decoding is worth offloading.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        match self {
            Self::Bytes(b) => b.len(),
            Self::Drained | Self::Body(_) => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Decoded values
// ---------------------------------------------------------------------------

/// One page of a paged collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub items: Vec<Value>,
    pub continuation_token: Option<String>,
}

impl Page {
    /// Extracts items and the continuation token named by `contract`.
    ///
    /// # Errors
    ///
    /// Fails if the items field is missing or not an array, or the
    /// continuation field is present but not a string.
    pub fn from_value(value: Value, contract: &PageContract) -> Result<Self, DecodeError> {
        let Value::Object(mut fields) = value else {
            return Err(DecodeError::PageContract("page body is not an object".to_owned()));
        };
        let items = match fields.remove(&contract.items_name) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(DecodeError::PageContract(format!(
                    "missing {:?} array",
                    contract.items_name
                )))
            }
        };
        let continuation_token = match fields.remove(&contract.next_link_name) {
            None | Some(Value::Null) => None,
            Some(Value::String(token)) => Some(token),
            Some(_) => {
                return Err(DecodeError::PageContract(format!(
                    "{:?} is not a string",
                    contract.next_link_name
                )))
            }
        };
        Ok(Self {
            items,
            continuation_token,
        })
    }

    /// Deserializes every item into `T`.
    ///
    /// # Errors
    ///
    /// Fails on the first item that does not match `T`.
    pub fn items_as<T: DeserializeOwned>(&self) -> Result<Vec<T>, DecodeError> {
        self.items
            .iter()
            .map(|item| serde_json::from_value(item.clone()).map_err(DecodeError::Convert))
            .collect()
    }
}

/// Result of a successful call.
#[derive(Debug)]
pub enum Decoded {
    None,
    Bool(bool),
    Bytes(Bytes),
    Stream(ResponseBody),
    Binary(BinaryData),
    Json(Value),
    Page(Page),
    Envelope(Box<Envelope>),
}

impl Decoded {
    /// Short name of the variant, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
            Self::Stream(_) => "stream",
            Self::Binary(_) => "binary",
            Self::Json(_) => "json",
            Self::Page(_) => "page",
            Self::Envelope(_) => "envelope",
        }
    }

    /// Converts a value-like result into `T`. Envelopes convert their body.
    ///
    /// # Errors
    ///
    /// Fails for byte and stream results, or when the value does not match `T`.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, DecodeError> {
        let value = match self {
            Self::None => Value::Null,
            Self::Bool(b) => Value::Bool(b),
            Self::Json(v) => v,
            Self::Page(page) => serde_json::to_value(page).map_err(DecodeError::Convert)?,
            Self::Envelope(envelope) => return envelope.body.into_json(),
            other => return Err(DecodeError::NotJson(other.kind())),
        };
        serde_json::from_value(value).map_err(DecodeError::Convert)
    }

    /// The JSON value, looking through envelopes.
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Envelope(envelope) => envelope.body.as_json(),
            _ => None,
        }
    }

    /// Whether the call produced no value.
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

/// Turns a successful response into its declared result.
///
/// # Errors
///
/// Returns [`DecodeError`] for undecodable bodies, page contract violations,
/// or a payload that was not consumed as the strategy requires.
pub fn decode(
    head: ResponseHead,
    payload: Payload,
    descriptor: &EndpointDescriptor,
    serializer: &dyn Serializer,
    envelopes: &EnvelopeRegistry,
) -> Result<Decoded, DecodeError> {
    let strategy = DecodeStrategy::for_descriptor(descriptor);
    let body = decode_body(strategy, &head, payload, descriptor, serializer)?;

    let shape = &descriptor.return_shape;
    if !shape.is_envelope {
        return Ok(body);
    }
    if shape.is_paged_envelope && !matches!(body, Decoded::Page(_)) {
        return Err(DecodeError::PageContract(format!(
            "paged envelope received a {} body",
            body.kind()
        )));
    }

    let decoded_headers = shape
        .headers_eagerly_decoded
        .then(|| serializer.deserialize_headers(&head.headers));
    let kind = shape.envelope_kind.as_deref().unwrap_or(crate::envelope::RESPONSE);
    let envelope = envelopes.construct(
        kind,
        EnvelopeParts {
            request: head.request,
            status: head.status,
            headers: head.headers,
            body,
            decoded_headers,
        },
    );
    Ok(Decoded::Envelope(Box::new(envelope)))
}

fn decode_body(
    strategy: DecodeStrategy,
    head: &ResponseHead,
    payload: Payload,
    descriptor: &EndpointDescriptor,
    serializer: &dyn Serializer,
) -> Result<Decoded, DecodeError> {
    match (strategy, payload) {
        (DecodeStrategy::Drain, _) => Ok(Decoded::None),
        (DecodeStrategy::HeadBool, _) => Ok(Decoded::Bool(head.status.is_success())),
        (DecodeStrategy::RawBytes, Payload::Bytes(bytes)) => match descriptor.return_wire_type {
            Some(WireType::Base64Url) => Ok(Decoded::Bytes(decode_base64url(&bytes)?)),
            None => Ok(Decoded::Bytes(bytes)),
        },
        (DecodeStrategy::Passthrough, Payload::Body(body)) => Ok(Decoded::Stream(body)),
        (DecodeStrategy::LazyBinary, Payload::Body(body)) => Ok(Decoded::Binary(BinaryData::new(
            body,
            head.content_type().map(str::to_owned),
            head.content_length(),
        ))),
        (DecodeStrategy::Deserialize, Payload::Bytes(bytes)) => {
            if bytes.is_empty() {
                return if descriptor.return_shape.unwrapped_body_type == BodyType::Page {
                    Err(DecodeError::PageContract("page body is empty".to_owned()))
                } else {
                    Ok(Decoded::None)
                };
            }
            let value = serializer.deserialize(&bytes, Encoding::from_content_type(head.content_type()))?;
            if descriptor.return_shape.unwrapped_body_type == BodyType::Page {
                Ok(Decoded::Page(Page::from_value(value, &descriptor.page)?))
            } else {
                Ok(Decoded::Json(value))
            }
        }
        (DecodeStrategy::RawBytes | DecodeStrategy::Deserialize, _) => {
            Err(DecodeError::UnexpectedPayload { expected: "bytes" })
        }
        (DecodeStrategy::Passthrough | DecodeStrategy::LazyBinary, _) => {
            Err(DecodeError::UnexpectedPayload { expected: "body" })
        }
    }
}

/// Accepts either a bare base64url string or a JSON string literal, with or
/// without padding.
fn decode_base64url(raw: &[u8]) -> Result<Bytes, DecodeError> {
    let text = std::str::from_utf8(raw).map_err(SerdeError::from)?.trim();
    let text = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
        .trim_end_matches('=');
    Ok(Bytes::from(URL_SAFE_NO_PAD.decode(text)?))
}
