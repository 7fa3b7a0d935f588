//! In-memory transport replaying scripted responses. Used by tests and by
//! the CLI's `--dry-run` mode.

use std::collections::VecDeque;
use std::io::{self, Cursor, Read};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use parking_lot::Mutex;
use wirebind_core::{HttpRequest, HttpResponse, RequestBody, ResponseBody};

use crate::context::InvocationContext;
use crate::error::TransportError;
use crate::traits::HttpTransport;

/// One canned response.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Never completes; for cancellation tests.
    pub hang: bool,
    /// The body stream yields `body` and then stays pending.
    pub stall_body: bool,
}

impl ScriptedResponse {
    /// An empty-bodied response. Unknown codes become 500.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            hang: false,
            stall_body: false,
        }
    }

    /// A JSON body with a matching `Content-Length`.
    #[must_use]
    pub fn json(status: u16, body: &str) -> Self {
        Self::new(status)
            .header("content-type", "application/json")
            .body(Bytes::from(body.to_owned()))
    }

    /// A response that never arrives.
    #[must_use]
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new(200)
        }
    }

    /// Delivers the head and the body bytes, then never ends the body.
    #[must_use]
    pub fn stalled(mut self) -> Self {
        self.stall_body = true;
        self
    }

    /// Sets a header. Invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Sets the body and a matching `Content-Length`.
    #[must_use]
    pub fn body(mut self, body: Bytes) -> Self {
        self.headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        self.body = body;
        self
    }
}

/// A request as the transport saw it, body fully read.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Replays queued responses in order and records every request.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
    drained: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
    aborted: Arc<AtomicBool>,
}

impl ScriptedTransport {
    /// A transport that replays `responses` in order.
    #[must_use]
    pub fn new(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Queues one more response.
    pub fn push(&self, response: ScriptedResponse) {
        self.responses.lock().push_back(response);
    }

    /// Every request sent so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Whether the last response body was read to its end.
    #[must_use]
    pub fn body_drained(&self) -> bool {
        self.drained.load(Ordering::SeqCst)
    }

    /// Whether the last async response body stream has been dropped.
    #[must_use]
    pub fn body_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Whether an in-flight hanging send was dropped before completing.
    #[must_use]
    pub fn send_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> Result<ScriptedResponse, TransportError> {
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| TransportError::Io(io::Error::other("no scripted response left")))
    }

    fn record(&self, request: &HttpRequest, body: Bytes) {
        self.requests.lock().push(RecordedRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body,
        });
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(
        &self,
        mut request: HttpRequest,
        _ctx: &InvocationContext,
    ) -> Result<HttpResponse, TransportError> {
        let body = match std::mem::replace(&mut request.body, RequestBody::Empty) {
            RequestBody::Empty => Bytes::new(),
            RequestBody::Bytes(bytes) => bytes,
            RequestBody::Stream { mut stream, .. } => {
                let mut buf = Vec::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Bytes::from(buf)
            }
            RequestBody::Reader { mut reader, .. } => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Bytes::from(buf)
            }
        };
        self.record(&request, body);

        let scripted = self.next_response()?;
        if scripted.hang {
            let _guard = AbortFlag(Arc::clone(&self.aborted));
            std::future::pending::<()>().await;
        }
        self.drained.store(false, Ordering::SeqCst);
        self.released.store(false, Ordering::SeqCst);
        Ok(HttpResponse {
            status: scripted.status,
            headers: scripted.headers,
            body: ResponseBody::Stream(Box::pin(TrackedStream {
                remaining: Some(scripted.body),
                stall: scripted.stall_body,
                drained: Arc::clone(&self.drained),
                _released: AbortFlag(Arc::clone(&self.released)),
            })),
            request: request.snapshot(),
        })
    }

    fn send_blocking(
        &self,
        mut request: HttpRequest,
        _ctx: &InvocationContext,
    ) -> Result<HttpResponse, TransportError> {
        let body = match std::mem::replace(&mut request.body, RequestBody::Empty) {
            RequestBody::Empty => Bytes::new(),
            RequestBody::Bytes(bytes) => bytes,
            RequestBody::Reader { mut reader, .. } => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Bytes::from(buf)
            }
            RequestBody::Stream { .. } => return Err(TransportError::UnsupportedBody("async stream")),
        };
        self.record(&request, body);

        let scripted = self.next_response()?;
        self.drained.store(false, Ordering::SeqCst);
        Ok(HttpResponse {
            status: scripted.status,
            headers: scripted.headers,
            body: ResponseBody::Reader(Box::new(TrackedReader {
                inner: Cursor::new(scripted.body),
                drained: Arc::clone(&self.drained),
            })),
            request: request.snapshot(),
        })
    }
}

/// Sets its flag when dropped.
struct AbortFlag(Arc<AtomicBool>);

impl Drop for AbortFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Single-chunk stream that flags end-of-data, or stalls after its chunk.
struct TrackedStream {
    remaining: Option<Bytes>,
    stall: bool,
    drained: Arc<AtomicBool>,
    _released: AbortFlag,
}

impl Stream for TrackedStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.remaining.take() {
            Some(chunk) if !chunk.is_empty() => Poll::Ready(Some(Ok(chunk))),
            _ if self.stall => Poll::Pending,
            _ => {
                self.drained.store(true, Ordering::SeqCst);
                Poll::Ready(None)
            }
        }
    }
}

struct TrackedReader {
    inner: Cursor<Bytes>,
    drained: Arc<AtomicBool>,
}

impl Read for TrackedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 || self.inner.position() == self.inner.get_ref().len() as u64 {
            self.drained.store(true, Ordering::SeqCst);
        }
        Ok(n)
    }
}
