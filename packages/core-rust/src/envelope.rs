//! Result envelopes: decoded body plus status, headers and request.
//!
//! Envelope kinds are string identifiers backed by factories registered
//! ahead of time. Each factory declares the widest argument set it accepts;
//! [`EnvelopeRegistry::construct`] picks the widest one the response can
//! satisfy.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::decode::{DecodeError, Decoded, Page};
use crate::wire::RequestSnapshot;

/// Plain response envelope.
pub const RESPONSE: &str = "Response";
/// Envelope carrying decoded headers.
pub const RESPONSE_BASE: &str = "ResponseBase";
/// Envelope around a live body stream.
pub const STREAM_RESPONSE: &str = "StreamResponse";
/// Envelope around one page of a paged collection.
pub const PAGED_RESPONSE: &str = "PagedResponse";

/// Arguments a factory consumes, narrowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnvelopeArity {
    /// Request, status and headers.
    Basic,
    /// Plus the decoded body.
    WithBody,
    /// Plus the decoded header object.
    WithHeaders,
}

/// Everything available for building an envelope.
#[derive(Debug)]
pub struct EnvelopeParts {
    pub request: RequestSnapshot,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Decoded,
    pub decoded_headers: Option<Value>,
}

/// A factory's refusal; the parts are handed back for the fallback.
#[derive(Debug)]
pub struct ConstructionFailure {
    pub parts: EnvelopeParts,
    pub reason: String,
}

pub type EnvelopeFactory =
    Arc<dyn Fn(EnvelopeParts) -> Result<Envelope, ConstructionFailure> + Send + Sync>;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Envelope {
    pub kind: String,
    pub request: RequestSnapshot,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Decoded,
    pub decoded_headers: Option<Value>,
    /// Set when the registered factory failed and this is the generic fallback.
    pub construction_failure: Option<String>,
}

impl Envelope {
    /// Builds an envelope keeping only what `arity` accepts.
    #[must_use]
    pub fn from_parts(kind: &str, arity: EnvelopeArity, parts: EnvelopeParts) -> Self {
        let EnvelopeParts {
            request,
            status,
            headers,
            body,
            decoded_headers,
        } = parts;
        Self {
            kind: kind.to_owned(),
            request,
            status,
            headers,
            body: if arity >= EnvelopeArity::WithBody { body } else { Decoded::None },
            decoded_headers: decoded_headers.filter(|_| arity >= EnvelopeArity::WithHeaders),
            construction_failure: None,
        }
    }

    /// The body as JSON, if it is a value.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.body.as_json()
    }

    /// The body as a page, if the operation is paged.
    #[must_use]
    pub fn page(&self) -> Option<&Page> {
        match &self.body {
            Decoded::Page(page) => Some(page),
            _ => None,
        }
    }

    /// Converts the body into `T`.
    ///
    /// # Errors
    ///
    /// See [`Decoded::into_json`].
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, DecodeError> {
        self.body.into_json()
    }

    /// Converts the decoded headers into `T`.
    ///
    /// # Errors
    ///
    /// Fails when headers were not decoded or do not match `T`.
    pub fn headers_as<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let value = self.decoded_headers.clone().ok_or(DecodeError::NotJson("undecoded headers"))?;
        serde_json::from_value(value).map_err(DecodeError::Convert)
    }
}

// ---------------------------------------------------------------------------
// EnvelopeRegistry
// ---------------------------------------------------------------------------

/// Envelope kind -> factories by arity.
pub struct EnvelopeRegistry {
    factories: DashMap<String, Vec<(EnvelopeArity, EnvelopeFactory)>>,
}

impl EnvelopeRegistry {
    /// An empty registry. See [`Self::with_defaults`] for the built-in kinds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// Registry with the stock envelope kinds.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register_standard(RESPONSE, EnvelopeArity::WithBody);
        registry.register_standard(RESPONSE_BASE, EnvelopeArity::WithHeaders);
        registry.register_standard(STREAM_RESPONSE, EnvelopeArity::WithBody);
        registry.register_standard(PAGED_RESPONSE, EnvelopeArity::WithBody);
        registry
    }

    /// Adds a factory for `kind`, replacing one of the same arity.
    pub fn register(&self, kind: &str, arity: EnvelopeArity, factory: EnvelopeFactory) {
        let mut entry = self.factories.entry(kind.to_owned()).or_default();
        entry.retain(|(a, _)| *a != arity);
        entry.push((arity, factory));
    }

    /// Registers a factory that accepts any parts at `arity`.
    pub fn register_standard(&self, kind: &str, arity: EnvelopeArity) {
        let name = kind.to_owned();
        self.register(
            kind,
            arity,
            Arc::new(move |parts: EnvelopeParts| -> Result<Envelope, ConstructionFailure> {
                Ok(Envelope::from_parts(&name, arity, parts))
            }),
        );
    }

    /// Builds an envelope of `kind` with the widest factory the parts satisfy.
    ///
    /// A missing or failing factory yields a generic envelope that keeps every
    /// part and records the reason in [`Envelope::construction_failure`].
    #[must_use]
    pub fn construct(&self, kind: &str, parts: EnvelopeParts) -> Envelope {
        let available = if parts.decoded_headers.is_some() {
            EnvelopeArity::WithHeaders
        } else {
            EnvelopeArity::WithBody
        };
        let factory = self.factories.get(kind).and_then(|entry| {
            entry
                .iter()
                .filter(|(arity, _)| *arity <= available)
                .max_by_key(|(arity, _)| *arity)
                .map(|(_, factory)| Arc::clone(factory))
        });

        let (parts, reason) = match factory {
            Some(factory) => match factory(parts) {
                Ok(envelope) => return envelope,
                Err(ConstructionFailure { parts, reason }) => (parts, reason),
            },
            None => (parts, format!("no envelope factory registered for {kind:?}")),
        };

        tracing::warn!(kind, reason = %reason, "falling back to generic envelope");
        let mut envelope = Envelope::from_parts(kind, EnvelopeArity::WithHeaders, parts);
        envelope.construction_failure = Some(reason);
        envelope
    }
}

impl Default for EnvelopeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for EnvelopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        kinds.sort();
        f.debug_struct("EnvelopeRegistry").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use serde_json::json;

    use super::*;

    fn parts(decoded_headers: Option<Value>) -> EnvelopeParts {
        EnvelopeParts {
            request: RequestSnapshot {
                method: Method::GET,
                url: "https://example.com/x".into(),
                headers: HeaderMap::new(),
            },
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Decoded::Json(json!({"id": 1})),
            decoded_headers,
        }
    }

    #[test]
    fn picks_widest_satisfiable_factory() {
        let registry = EnvelopeRegistry::new();
        registry.register_standard("Custom", EnvelopeArity::Basic);
        registry.register_standard("Custom", EnvelopeArity::WithBody);
        registry.register_standard("Custom", EnvelopeArity::WithHeaders);

        let without_headers = registry.construct("Custom", parts(None));
        assert_eq!(without_headers.value(), Some(&json!({"id": 1})));
        assert!(without_headers.decoded_headers.is_none());

        let with_headers = registry.construct("Custom", parts(Some(json!({"etag": "x"}))));
        assert_eq!(with_headers.decoded_headers, Some(json!({"etag": "x"})));
    }

    #[test]
    fn basic_factory_drops_body() {
        let registry = EnvelopeRegistry::new();
        registry.register_standard("StatusOnly", EnvelopeArity::Basic);
        let envelope = registry.construct("StatusOnly", parts(None));
        assert!(envelope.body.is_none());
        assert_eq!(envelope.status, StatusCode::OK);
    }

    #[test]
    fn failing_factory_falls_back_to_generic() {
        let registry = EnvelopeRegistry::new();
        registry.register(
            "Strict",
            EnvelopeArity::WithBody,
            Arc::new(|parts: EnvelopeParts| -> Result<Envelope, ConstructionFailure> {
                Err(ConstructionFailure {
                    parts,
                    reason: "body must be a string".into(),
                })
            }),
        );
        let envelope = registry.construct("Strict", parts(None));
        assert_eq!(envelope.construction_failure.as_deref(), Some("body must be a string"));
        assert_eq!(envelope.value(), Some(&json!({"id": 1})));
    }

    #[test]
    fn unregistered_kind_falls_back_to_generic() {
        let envelope = EnvelopeRegistry::with_defaults().construct("Unknown", parts(None));
        assert!(envelope.construction_failure.is_some());
        assert_eq!(envelope.kind, "Unknown");
    }

    #[test]
    fn typed_body_and_headers() {
        #[derive(serde::Deserialize)]
        struct Item {
            id: u8,
        }
        #[derive(serde::Deserialize)]
        struct Headers {
            etag: String,
        }
        let envelope = EnvelopeRegistry::with_defaults().construct(RESPONSE_BASE, parts(Some(json!({"etag": "v"}))));
        assert_eq!(envelope.headers_as::<Headers>().unwrap().etag, "v");
        assert_eq!(envelope.into_typed::<Item>().unwrap().id, 1);
    }
}
