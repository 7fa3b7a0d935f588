//! `reqwest`-backed transport for both execution models.

use std::io::{self, Read};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use wirebind_core::{HttpRequest, HttpResponse, RequestBody, ResponseBody};

use crate::context::InvocationContext;
use crate::error::TransportError;
use crate::traits::HttpTransport;

/// Async `reqwest::Client` plus a lazily created blocking client.
///
/// The blocking client is built on first blocking use, so a transport used
/// only from async code never spins up `reqwest`'s internal runtime. As with
/// `reqwest::blocking` itself, blocking sends must not run on an async worker.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    blocking: OnceLock<reqwest::blocking::Client>,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialized.
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build().map_err(client_error)?,
            blocking: OnceLock::new(),
            timeout,
        })
    }

    fn blocking_client(&self) -> Result<&reqwest::blocking::Client, TransportError> {
        if let Some(client) = self.blocking.get() {
            return Ok(client);
        }
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(client_error)?;
        Ok(self.blocking.get_or_init(|| client))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: HttpRequest,
        ctx: &InvocationContext,
    ) -> Result<HttpResponse, TransportError> {
        let snapshot = request.snapshot();
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;
        tracing::debug!(request_id = %ctx.request_id, %method, %url, "sending request");

        let mut builder = self.client.request(method, url.as_str()).headers(headers);
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Stream { stream, .. } => builder.body(reqwest::Body::wrap_stream(stream)),
            RequestBody::Reader { reader, .. } => {
                let bytes = tokio::task::spawn_blocking(move || read_all(reader))
                    .await
                    .map_err(io::Error::other)??;
                builder.body(bytes)
            }
        };

        let response = builder.send().await.map_err(client_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let stream = response.bytes_stream().map_err(io::Error::other);
        Ok(HttpResponse {
            status,
            headers,
            body: ResponseBody::Stream(Box::pin(stream)),
            request: snapshot,
        })
    }

    fn send_blocking(
        &self,
        request: HttpRequest,
        ctx: &InvocationContext,
    ) -> Result<HttpResponse, TransportError> {
        let client = self.blocking_client()?;
        let snapshot = request.snapshot();
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;
        tracing::debug!(request_id = %ctx.request_id, %method, %url, "sending blocking request");

        let mut builder = client.request(method, url.as_str()).headers(headers);
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes.to_vec()),
            RequestBody::Reader {
                reader,
                length: Some(length),
            } => builder.body(reqwest::blocking::Body::sized(reader, length)),
            RequestBody::Reader { reader, length: None } => {
                builder.body(reqwest::blocking::Body::new(reader))
            }
            RequestBody::Stream { .. } => return Err(TransportError::UnsupportedBody("async stream")),
        };

        let response = builder.send().map_err(client_error)?;
        Ok(HttpResponse {
            status: response.status(),
            headers: response.headers().clone(),
            body: ResponseBody::Reader(Box::new(response)),
            request: snapshot,
        })
    }
}

fn read_all(mut reader: Box<dyn Read + Send>) -> io::Result<Bytes> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(Bytes::from(buf))
}

fn client_error(err: reqwest::Error) -> TransportError {
    if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Client(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_url_is_an_invalid_request() {
        let transport = ReqwestTransport::new(None).unwrap();
        let request = HttpRequest {
            method: http::Method::GET,
            url: "not a url".into(),
            headers: http::HeaderMap::new(),
            body: RequestBody::Empty,
        };
        let err = transport.send(request, &InvocationContext::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }
}
