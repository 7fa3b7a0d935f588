//! Call arguments bound to descriptor substitutions by position.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde_json::Value;

use crate::body::RequestBody;

/// One positional argument of an operation call.
///
/// Scalars feed host/path/query/header substitutions, `List` feeds
/// multi-valued query parameters, `Map` feeds prefixed headers and form
/// fields, and any variant may be a request body.
#[derive(Debug)]
pub enum Arg {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Bytes),
    Json(Value),
    List(Vec<Arg>),
    Map(BTreeMap<String, Arg>),
    /// Streaming request body with its declared length.
    Body(RequestBody),
}

impl Arg {
    /// Whether the argument is absent, including a JSON `null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Json(Value::Null))
    }

    /// Short name of the variant, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Body(_) => "body",
        }
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Bytes> for Arg {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<RequestBody> for Arg {
    fn from(value: RequestBody) -> Self {
        Self::Body(value)
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Arg>> From<Vec<T>> for Arg {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Arg>> From<BTreeMap<String, T>> for Arg {
    fn from(values: BTreeMap<String, T>) -> Self {
        Self::Map(values.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_none_is_null() {
        let arg: Arg = Option::<String>::None.into();
        assert!(arg.is_null());
    }

    #[test]
    fn json_null_is_null() {
        assert!(Arg::Json(Value::Null).is_null());
        assert!(!Arg::Text(String::new()).is_null());
    }

    #[test]
    fn vec_becomes_list() {
        let arg: Arg = vec!["a", "b"].into();
        assert!(matches!(arg, Arg::List(ref items) if items.len() == 2));
        assert_eq!(arg.kind(), "list");
    }
}
