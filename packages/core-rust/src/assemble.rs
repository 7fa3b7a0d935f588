//! Request assembly: descriptor + arguments -> transport-ready [`HttpRequest`].

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};

use crate::arg::Arg;
use crate::body::RequestBody;
use crate::descriptor::{EndpointDescriptor, SubstitutionKind};
use crate::serializer::{Encoding, SerdeError, Serializer};
use crate::template::{apply_headers, form_body, header_pairs, query_pairs, resolve};
use crate::wire::{media_type_is, HttpRequest, APPLICATION_FORM, APPLICATION_JSON, APPLICATION_OCTET_STREAM};

const SCHEME_SEPARATOR: &str = "://";

/// Failures while composing a request from valid arguments.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("header {name:?} has an invalid name or value")]
    InvalidHeader { name: String },
    #[error("body content type {0:?} is not a valid header value")]
    InvalidContentType(String),
    #[error("failed to serialize request body: {0}")]
    Serialization(#[from] SerdeError),
}

/// Composes the request for one call.
///
/// Header precedence, lowest first: static headers, body-driven
/// `Content-Type`/`Content-Length`, header substitutions. Substitutions never
/// override `Content-Length`, nor `Content-Type` when a body is present.
///
/// # Errors
///
/// Returns [`AssemblyError`] for unserializable bodies or invalid header values.
pub fn assemble(
    descriptor: &EndpointDescriptor,
    mut args: Vec<Arg>,
    serializer: &dyn Serializer,
    default_scheme: &str,
) -> Result<HttpRequest, AssemblyError> {
    let subs = &descriptor.substitutions;

    let host = resolve(&descriptor.host_template, subs, &args, serializer);
    let path = resolve(&descriptor.path_template, subs, &args, serializer);
    let mut url = if has_scheme(&path) {
        path
    } else {
        let base = if has_scheme(&host) {
            host
        } else {
            format!("{default_scheme}{SCHEME_SEPARATOR}{host}")
        };
        join_path(&base, &path)
    };

    let query = query_pairs(subs, &args, serializer);
    if !query.is_empty() {
        url.push(if url.contains('?') { '&' } else { '?' });
        let encoded: Vec<String> = query.into_iter().map(|(k, v)| format!("{k}={v}")).collect();
        url.push_str(&encoded.join("&"));
    }

    let mut headers = HeaderMap::new();
    for (name, value) in &descriptor.static_headers {
        headers.insert(name.clone(), value.clone());
    }

    let headers_from_args = header_pairs(subs, &args, serializer);
    let form = if descriptor.substitutions_of(SubstitutionKind::Form).next().is_some() {
        form_body(subs, &args, serializer)
    } else {
        None
    };
    let body_arg = descriptor
        .body_argument_index
        .and_then(|i| args.get_mut(i))
        .map(|slot| std::mem::replace(slot, Arg::Null))
        .filter(|arg| !arg.is_null());

    let (body, content_type) = match (body_arg, form) {
        (Some(arg), _) => {
            let content_type = descriptor
                .body_content_type
                .clone()
                .unwrap_or_else(|| infer_content_type(&arg).to_owned());
            (serialize_body(arg, &content_type, serializer)?, Some(content_type))
        }
        (None, Some(form)) => (
            RequestBody::Bytes(Bytes::from(form)),
            Some(descriptor.body_content_type.clone().unwrap_or_else(|| APPLICATION_FORM.to_owned())),
        ),
        (None, None) => (RequestBody::Empty, None),
    };

    let has_body = !body.is_empty();
    if let Some(ct) = content_type {
        let value = HeaderValue::from_str(&ct).map_err(|_| AssemblyError::InvalidContentType(ct.clone()))?;
        headers.insert(CONTENT_TYPE, value);
    }
    match body.known_length() {
        Some(len) => {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        }
        None => {
            headers.remove(CONTENT_LENGTH);
        }
    }

    apply_headers(&mut headers, headers_from_args, |name| {
        *name != CONTENT_LENGTH && !(has_body && *name == CONTENT_TYPE)
    })
    .map_err(|name| AssemblyError::InvalidHeader { name })?;

    tracing::trace!(
        operation = %descriptor.id,
        method = %descriptor.http_method,
        url = %url,
        "assembled request"
    );

    Ok(HttpRequest {
        method: descriptor.http_method.clone(),
        url,
        headers,
        body,
    })
}

/// Raw bytes, text and streaming bodies default to octet-stream; everything
/// else is JSON.
fn infer_content_type(arg: &Arg) -> &'static str {
    match arg {
        Arg::Bytes(_) | Arg::Text(_) | Arg::Body(_) => APPLICATION_OCTET_STREAM,
        _ => APPLICATION_JSON,
    }
}

fn serialize_body(
    arg: Arg,
    content_type: &str,
    serializer: &dyn Serializer,
) -> Result<RequestBody, AssemblyError> {
    let raw = media_type_is(content_type, APPLICATION_OCTET_STREAM);
    Ok(match arg {
        Arg::Body(body) => body,
        Arg::Bytes(bytes) if raw => RequestBody::Bytes(bytes),
        Arg::Text(text) if raw => RequestBody::Bytes(Bytes::from(text)),
        other => RequestBody::Bytes(
            serializer.serialize_to_bytes(&other, Encoding::from_content_type(Some(content_type)))?,
        ),
    })
}

/// Whether `s` begins with `scheme://`. A `://` later in the string, such as
/// inside a query value, does not count.
fn has_scheme(s: &str) -> bool {
    s.split_once(SCHEME_SEPARATOR).is_some_and(|(scheme, _)| {
        let mut chars = scheme.chars();
        chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Joins with exactly one `/` between the two parts.
fn join_path(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_owned();
    }
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::io::Cursor;

    use http::Method;
    use serde_json::json;

    use super::*;
    use crate::descriptor::build_interface;
    use crate::metadata::{InterfaceMetadata, OperationMetadata};
    use crate::serializer::JsonSerializer;

    fn descriptor(host: &str, op: OperationMetadata) -> EndpointDescriptor {
        build_interface(&InterfaceMetadata::new("Items", host).operation(op))
            .unwrap()
            .remove(0)
    }

    fn body_bytes(request: &HttpRequest) -> &[u8] {
        match &request.body {
            RequestBody::Bytes(b) => b,
            other => panic!("expected buffered body, got {other:?}"),
        }
    }

    #[test]
    fn get_item_by_id() {
        let d = descriptor(
            "{endpoint}",
            OperationMetadata::new("getItem")
                .get("/items/{id}")
                .host_param("endpoint", 0)
                .path_param("id", 1),
        );
        let req = assemble(&d, vec!["example.com".into(), Arg::Int(42)], &JsonSerializer, "https").unwrap();
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.url, "https://example.com/items/42");
        assert_eq!(req.headers[CONTENT_LENGTH], "0");
        assert!(req.body.is_empty());
    }

    #[test]
    fn host_argument_with_scheme_overrides_default() {
        let d = descriptor(
            "{endpoint}",
            OperationMetadata::new("ping").get("ping").host_param("endpoint", 0),
        );
        let req = assemble(&d, vec!["http://localhost:8080/".into()], &JsonSerializer, "https").unwrap();
        assert_eq!(req.url, "http://localhost:8080/ping");
    }

    #[test]
    fn absolute_path_bypasses_host() {
        let d = descriptor(
            "https://example.com",
            OperationMetadata::new("next").get("{nextLink}").raw_path_param("nextLink", 0),
        );
        let link = "https://other.example.com/items?page=2";
        let req = assemble(&d, vec![link.into()], &JsonSerializer, "https").unwrap();
        assert_eq!(req.url, link);
    }

    #[test]
    fn scheme_inside_query_value_keeps_the_host() {
        let d = descriptor(
            "https://example.com",
            OperationMetadata::new("redirect").get("/redirect?to=https://x"),
        );
        let req = assemble(&d, vec![], &JsonSerializer, "https").unwrap();
        assert_eq!(req.url, "https://example.com/redirect?to=https://x");
    }

    #[test]
    fn scheme_detection_requires_a_leading_scheme() {
        assert!(has_scheme("https://h/p"));
        assert!(has_scheme("svn+ssh://h"));
        assert!(!has_scheme("/redirect?to=https://x"));
        assert!(!has_scheme("localhost:8080"));
        assert!(!has_scheme("://h"));
        assert!(!has_scheme("1http://h"));
    }

    #[test]
    fn multi_query_entries_keep_list_order() {
        let d = descriptor(
            "https://example.com",
            OperationMetadata::new("list")
                .get("/items")
                .multi_query_param("tag", 0)
                .query_param("api-version", 1),
        );
        let req = assemble(
            &d,
            vec![vec!["a", "b", "c"].into(), "2024-01-01".into()],
            &JsonSerializer,
            "https",
        )
        .unwrap();
        assert_eq!(
            req.url,
            "https://example.com/items?tag=a&tag=b&tag=c&api-version=2024-01-01"
        );
    }

    #[test]
    fn query_appends_to_existing_query_string() {
        let d = descriptor(
            "https://example.com",
            OperationMetadata::new("list").get("/items?fixed=1").query_param("q", 0),
        );
        let req = assemble(&d, vec!["x".into()], &JsonSerializer, "https").unwrap();
        assert_eq!(req.url, "https://example.com/items?fixed=1&q=x");
    }

    #[test]
    fn json_body_sets_content_headers() {
        let d = descriptor(
            "https://example.com",
            OperationMetadata::new("create").post("/items").body_param(0, None),
        );
        let req = assemble(&d, vec![json!({"name": "w"}).into()], &JsonSerializer, "https").unwrap();
        assert_eq!(req.headers[CONTENT_TYPE], APPLICATION_JSON);
        assert_eq!(body_bytes(&req), br#"{"name":"w"}"#);
        assert_eq!(req.content_length(), Some(12));
    }

    #[test]
    fn raw_bytes_default_to_octet_stream() {
        let d = descriptor(
            "https://example.com",
            OperationMetadata::new("upload").put("/blob").body_param(0, None),
        );
        let req = assemble(&d, vec![Bytes::from_static(b"\x00\x01").into()], &JsonSerializer, "https").unwrap();
        assert_eq!(req.headers[CONTENT_TYPE], APPLICATION_OCTET_STREAM);
        assert_eq!(body_bytes(&req), b"\x00\x01");
    }

    #[test]
    fn explicit_content_type_wins() {
        let d = descriptor(
            "https://example.com",
            OperationMetadata::new("note")
                .put("/note")
                .body_param(0, Some("text/plain")),
        );
        let req = assemble(&d, vec!["hello".into()], &JsonSerializer, "https").unwrap();
        assert_eq!(req.headers[CONTENT_TYPE], "text/plain");
        assert_eq!(body_bytes(&req), b"hello");
    }

    #[test]
    fn streaming_body_without_length_has_no_content_length() {
        let d = descriptor(
            "https://example.com",
            OperationMetadata::new("upload").put("/blob").body_param(0, None),
        );
        let body = RequestBody::Reader {
            reader: Box::new(Cursor::new(vec![1u8; 8])),
            length: None,
        };
        let req = assemble(&d, vec![body.into()], &JsonSerializer, "https").unwrap();
        assert!(req.headers.get(CONTENT_LENGTH).is_none());
        assert_eq!(req.headers[CONTENT_TYPE], APPLICATION_OCTET_STREAM);
    }

    #[test]
    fn header_substitutions_apply_last_except_content_headers() {
        let d = descriptor(
            "https://example.com",
            OperationMetadata::new("create")
                .post("/items")
                .static_header("x-mode", "static")
                .body_param(0, None)
                .header_param("x-mode", 1)
                .header_param("content-type", 2),
        );
        let req = assemble(
            &d,
            vec![json!(1).into(), "dynamic".into(), "text/evil".into()],
            &JsonSerializer,
            "https",
        )
        .unwrap();
        assert_eq!(req.headers["x-mode"], "dynamic");
        assert_eq!(req.headers[CONTENT_TYPE], APPLICATION_JSON);
    }

    #[test]
    fn form_fields_become_urlencoded_body() {
        let mut extra = BTreeMap::new();
        extra.insert("scope".to_string(), Arg::from("a b"));
        let d = descriptor(
            "https://login.example.com",
            OperationMetadata::new("token")
                .post("/oauth2/token")
                .form_param("grant_type", 0)
                .form_param("extra", 1),
        );
        let req = assemble(
            &d,
            vec!["client_credentials".into(), Arg::Map(extra)],
            &JsonSerializer,
            "https",
        )
        .unwrap();
        assert_eq!(req.headers[CONTENT_TYPE], APPLICATION_FORM);
        assert_eq!(body_bytes(&req), b"grant_type=client_credentials&scope=a+b");
    }

    #[test]
    fn null_body_is_no_body() {
        let d = descriptor(
            "https://example.com",
            OperationMetadata::new("create").post("/items").body_param(0, None),
        );
        let req = assemble(&d, vec![Arg::Null], &JsonSerializer, "https").unwrap();
        assert!(req.body.is_empty());
        assert_eq!(req.headers[CONTENT_LENGTH], "0");
        assert!(req.headers.get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn invalid_header_value_is_an_error() {
        let d = descriptor(
            "https://example.com",
            OperationMetadata::new("get").get("/x").header_param("x-bad", 0),
        );
        let err = assemble(&d, vec!["a\nb".into()], &JsonSerializer, "https").unwrap_err();
        assert!(matches!(err, AssemblyError::InvalidHeader { name } if name == "x-bad"));
    }

    #[test]
    fn join_path_never_doubles_or_drops_slash() {
        assert_eq!(join_path("https://h", "/p"), "https://h/p");
        assert_eq!(join_path("https://h/", "/p"), "https://h/p");
        assert_eq!(join_path("https://h/", "p"), "https://h/p");
        assert_eq!(join_path("https://h", "p"), "https://h/p");
        assert_eq!(join_path("https://h", ""), "https://h");
    }
}
