//! Wire-level HTTP request and response exchanged with transports.

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};

use crate::body::{RequestBody, ResponseBody};

/// `application/json`
pub const APPLICATION_JSON: &str = "application/json";
/// `application/octet-stream`
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
/// `application/x-www-form-urlencoded`
pub const APPLICATION_FORM: &str = "application/x-www-form-urlencoded";

/// Transport-ready request produced by the assembler.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl HttpRequest {
    /// Method, URL and headers, without the body.
    #[must_use]
    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
        }
    }

    /// Declared `Content-Length`, if present and numeric.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        content_length(&self.headers)
    }
}

/// Body-less copy of a request, carried by responses, envelopes and errors.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSnapshot {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
}

/// Response as returned by a transport, body not yet consumed.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    pub request: RequestSnapshot,
}

impl HttpResponse {
    /// Splits the response into its head and body.
    #[must_use]
    pub fn into_parts(self) -> (ResponseHead, ResponseBody) {
        (
            ResponseHead {
                status: self.status,
                headers: self.headers,
                request: self.request,
            },
            self.body,
        )
    }
}

/// Status line, headers, and originating request of a response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub request: RequestSnapshot,
}

impl ResponseHead {
    /// Response `Content-Type`, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        content_type(&self.headers)
    }

    /// Parsed `Content-Length`, if present and valid.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        content_length(&self.headers)
    }
}

/// `Content-Type` header value as text.
#[must_use]
pub fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

/// `Content-Length` header value, parsed.
#[must_use]
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Compares the essence of a content type (before any `;` parameters).
#[must_use]
pub fn media_type_is(content_type: &str, expected: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(expected))
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn parses_content_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
        assert_eq!(content_length(&headers), Some(42));
        assert!(media_type_is(content_type(&headers).unwrap(), APPLICATION_JSON));
    }

    #[test]
    fn malformed_content_length_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("lots"));
        assert_eq!(content_length(&headers), None);
    }

    #[test]
    fn media_type_comparison_is_case_insensitive() {
        assert!(media_type_is("Application/Octet-Stream", APPLICATION_OCTET_STREAM));
        assert!(!media_type_is("application/jsonx", APPLICATION_JSON));
    }
}
