//! Serializer collaborator: turns arguments into wire bytes and response
//! bytes into JSON values.
//!
//! The engine only decides *where* serialized bytes go; encoding itself lives
//! behind the [`Serializer`] trait. [`JsonSerializer`] is the stock
//! implementation built on `serde_json`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use http::HeaderMap;
use serde_json::{Map, Number, Value};

use crate::arg::Arg;
use crate::wire::media_type_is;

/// Wire encoding selected from a content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Xml,
    Text,
}

impl Encoding {
    /// Picks the encoding for a content type; unknown types default to JSON.
    #[must_use]
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(ct) = content_type else {
            return Self::Json;
        };
        let essence = ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        if essence.ends_with("/xml") || essence.ends_with("+xml") {
            Self::Xml
        } else if essence.starts_with("text/") && !media_type_is(&essence, "text/json") {
            Self::Text
        } else {
            Self::Json
        }
    }
}

/// Serialization failures.
#[derive(Debug, thiserror::Error)]
pub enum SerdeError {
    #[error("encoding {0:?} is not supported by this serializer")]
    UnsupportedEncoding(Encoding),
    #[error("{0} argument cannot be serialized")]
    Unserializable(&'static str),
    #[error("body is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Encodes call arguments and decodes response payloads.
pub trait Serializer: Send + Sync {
    /// Serializes a body argument in the given encoding.
    ///
    /// # Errors
    ///
    /// Returns [`SerdeError`] if the argument cannot be encoded.
    fn serialize_to_bytes(&self, value: &Arg, encoding: Encoding) -> Result<Bytes, SerdeError>;

    /// Decodes a response payload.
    ///
    /// # Errors
    ///
    /// Returns [`SerdeError`] for malformed payloads or unsupported encodings.
    fn deserialize(&self, bytes: &[u8], encoding: Encoding) -> Result<Value, SerdeError>;

    /// Serializes a scalar for a header, query, or path slot. `None` means
    /// the value is absent.
    fn serialize_raw(&self, value: &Arg) -> Option<String>;

    /// Decodes response headers into an object keyed by lowercase header name.
    /// Repeated headers are joined with `", "`.
    fn deserialize_headers(&self, headers: &HeaderMap) -> Value {
        let mut out = Map::new();
        for name in headers.keys() {
            let joined = headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(", ");
            out.insert(name.as_str().to_owned(), Value::String(joined));
        }
        Value::Object(out)
    }
}

/// `serde_json`-backed serializer. XML is not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// Converts an argument into a JSON value. Byte arrays become base64 strings.
    ///
    /// # Errors
    ///
    /// Streaming bodies and non-finite floats cannot be represented.
    pub fn to_json(value: &Arg) -> Result<Value, SerdeError> {
        Ok(match value {
            Arg::Null => Value::Null,
            Arg::Bool(b) => Value::Bool(*b),
            Arg::Int(i) => Value::Number((*i).into()),
            Arg::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .ok_or(SerdeError::Unserializable("non-finite float"))?,
            Arg::Text(s) => Value::String(s.clone()),
            Arg::Bytes(b) => Value::String(STANDARD.encode(b)),
            Arg::Json(v) => v.clone(),
            Arg::List(items) => Value::Array(items.iter().map(Self::to_json).collect::<Result<_, _>>()?),
            Arg::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), Self::to_json(v)?)))
                    .collect::<Result<_, SerdeError>>()?,
            ),
            Arg::Body(_) => return Err(SerdeError::Unserializable("streaming body")),
        })
    }
}

impl Serializer for JsonSerializer {
    fn serialize_to_bytes(&self, value: &Arg, encoding: Encoding) -> Result<Bytes, SerdeError> {
        match encoding {
            Encoding::Json => Ok(Bytes::from(serde_json::to_vec(&Self::to_json(value)?)?)),
            Encoding::Text => self
                .serialize_raw(value)
                .map(Bytes::from)
                .ok_or(SerdeError::Unserializable(value.kind())),
            Encoding::Xml => Err(SerdeError::UnsupportedEncoding(Encoding::Xml)),
        }
    }

    fn deserialize(&self, bytes: &[u8], encoding: Encoding) -> Result<Value, SerdeError> {
        match encoding {
            Encoding::Json => Ok(serde_json::from_slice(bytes)?),
            Encoding::Text => Ok(Value::String(std::str::from_utf8(bytes)?.to_owned())),
            Encoding::Xml => Err(SerdeError::UnsupportedEncoding(Encoding::Xml)),
        }
    }

    fn serialize_raw(&self, value: &Arg) -> Option<String> {
        match value {
            Arg::Null | Arg::Body(_) | Arg::Json(Value::Null) => None,
            Arg::Bool(b) => Some(b.to_string()),
            Arg::Int(i) => Some(i.to_string()),
            Arg::Float(f) => Some(f.to_string()),
            Arg::Text(s) => Some(s.clone()),
            Arg::Bytes(b) => Some(STANDARD.encode(b)),
            Arg::Json(Value::String(s)) => Some(s.clone()),
            Arg::Json(v) => Some(v.to_string()),
            Arg::List(items) => Some(
                items
                    .iter()
                    .filter_map(|item| self.serialize_raw(item))
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Arg::Map(_) => Self::to_json(value).ok().map(|v| v.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use http::HeaderValue;
    use serde_json::json;

    use super::*;

    #[test]
    fn encoding_from_content_type() {
        assert_eq!(Encoding::from_content_type(None), Encoding::Json);
        assert_eq!(Encoding::from_content_type(Some("application/json")), Encoding::Json);
        assert_eq!(Encoding::from_content_type(Some("application/atom+xml")), Encoding::Xml);
        assert_eq!(Encoding::from_content_type(Some("text/plain; charset=utf-8")), Encoding::Text);
        assert_eq!(Encoding::from_content_type(Some("text/json")), Encoding::Json);
    }

    #[test]
    fn raw_scalars() {
        let s = JsonSerializer;
        assert_eq!(s.serialize_raw(&Arg::Int(42)), Some("42".into()));
        assert_eq!(s.serialize_raw(&Arg::Bool(true)), Some("true".into()));
        assert_eq!(s.serialize_raw(&Arg::from("x y")), Some("x y".into()));
        assert_eq!(s.serialize_raw(&Arg::Null), None);
        assert_eq!(s.serialize_raw(&Arg::Json(json!("v"))), Some("v".into()));
    }

    #[test]
    fn raw_list_is_comma_joined_without_nulls() {
        let list = Arg::List(vec![Arg::from("a"), Arg::Null, Arg::Int(3)]);
        assert_eq!(JsonSerializer.serialize_raw(&list), Some("a,3".into()));
    }

    #[test]
    fn json_body_from_map() {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Arg::from("widget"));
        map.insert("count".to_string(), Arg::Int(2));
        let bytes = JsonSerializer
            .serialize_to_bytes(&Arg::Map(map), Encoding::Json)
            .unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"name": "widget", "count": 2}));
    }

    #[test]
    fn bytes_serialize_as_base64() {
        let value = JsonSerializer::to_json(&Arg::Bytes(Bytes::from_static(b"hi"))).unwrap();
        assert_eq!(value, json!("aGk="));
    }

    #[test]
    fn streaming_body_is_unserializable() {
        let arg = Arg::Body(crate::body::RequestBody::Empty);
        assert!(matches!(
            JsonSerializer.serialize_to_bytes(&arg, Encoding::Json),
            Err(SerdeError::Unserializable("streaming body"))
        ));
    }

    #[test]
    fn xml_is_unsupported() {
        assert!(matches!(
            JsonSerializer.deserialize(b"<a/>", Encoding::Xml),
            Err(SerdeError::UnsupportedEncoding(Encoding::Xml))
        ));
    }

    #[test]
    fn headers_decode_to_lowercase_object() {
        let mut headers = HeaderMap::new();
        headers.insert("ETag", HeaderValue::from_static("\"abc\""));
        headers.append("x-multi", HeaderValue::from_static("1"));
        headers.append("x-multi", HeaderValue::from_static("2"));
        let value = JsonSerializer.deserialize_headers(&headers);
        assert_eq!(value, json!({"etag": "\"abc\"", "x-multi": "1, 2"}));
    }
}
