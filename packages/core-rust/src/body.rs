//! Request and response body representations.
//!
//! A body is either fully buffered (`Bytes`), an async byte stream for the
//! non-blocking path, or a `Read` source for the blocking path. Transports
//! produce whichever fits their execution model; the executors consume them
//! with the matching `collect*`/`drain*` method.

use std::fmt;
use std::io::{self, Read};
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures_util::{stream, Stream, StreamExt};

use crate::length::{LengthMismatch, LengthValidatingReader, LengthValidatingStream};

/// Boxed async byte stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Boxed blocking byte source.
pub type ByteReader = Box<dyn Read + Send>;

/// Media types whose bodies are consumed incrementally and never buffered
/// by [`BinaryData`].
const STREAMING_MEDIA_TYPES: &[&str] = &[
    "application/octet-stream",
    "text/event-stream",
    "application/x-ndjson",
    "audio/",
    "video/",
];

// ---------------------------------------------------------------------------
// RequestBody
// ---------------------------------------------------------------------------

/// Outgoing request payload.
pub enum RequestBody {
    Empty,
    Bytes(Bytes),
    Stream {
        stream: ByteStream,
        length: Option<u64>,
    },
    Reader {
        reader: ByteReader,
        length: Option<u64>,
    },
}

impl RequestBody {
    /// Byte length when known up front.
    #[must_use]
    pub fn known_length(&self) -> Option<u64> {
        match self {
            Self::Empty => Some(0),
            Self::Bytes(b) => Some(b.len() as u64),
            Self::Stream { length, .. } | Self::Reader { length, .. } => *length,
        }
    }

    /// Whether there is no body at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Enforces `expected` over this body.
    ///
    /// Buffered bodies are checked immediately; streaming bodies are wrapped so
    /// the mismatch surfaces while the transport reads them.
    ///
    /// # Errors
    ///
    /// Returns the mismatch for buffered bodies of the wrong size.
    pub fn validate_length(self, expected: u64) -> Result<Self, LengthMismatch> {
        match self {
            Self::Empty => LengthMismatch::check(0, expected).map(|()| Self::Empty),
            Self::Bytes(b) => LengthMismatch::check(b.len() as u64, expected).map(|()| Self::Bytes(b)),
            Self::Stream { stream, .. } => Ok(Self::Stream {
                stream: Box::pin(LengthValidatingStream::new(stream, expected)),
                length: Some(expected),
            }),
            Self::Reader { reader, .. } => Ok(Self::Reader {
                reader: Box::new(LengthValidatingReader::new(reader, expected)),
                length: Some(expected),
            }),
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Self::Stream { length, .. } => write!(f, "Stream(length: {length:?})"),
            Self::Reader { length, .. } => write!(f, "Reader(length: {length:?})"),
        }
    }
}

// ---------------------------------------------------------------------------
// ResponseBody
// ---------------------------------------------------------------------------

/// Incoming response payload, not yet consumed.
pub enum ResponseBody {
    Empty,
    Bytes(Bytes),
    Stream(ByteStream),
    Reader(ByteReader),
}

impl ResponseBody {
    /// Enforces `expected` over this body, the same way as
    /// [`RequestBody::validate_length`].
    ///
    /// # Errors
    ///
    /// Returns the mismatch for buffered bodies of the wrong size.
    pub fn validate_length(self, expected: u64) -> Result<Self, LengthMismatch> {
        match self {
            Self::Empty => LengthMismatch::check(0, expected).map(|()| Self::Empty),
            Self::Bytes(b) => LengthMismatch::check(b.len() as u64, expected).map(|()| Self::Bytes(b)),
            Self::Stream(s) => Ok(Self::Stream(Box::pin(LengthValidatingStream::new(s, expected)))),
            Self::Reader(r) => Ok(Self::Reader(Box::new(LengthValidatingReader::new(r, expected)))),
        }
    }

    /// Reads the whole body into memory.
    ///
    /// A `Reader` body is read in place, which blocks the current thread.
    ///
    /// # Errors
    ///
    /// Propagates stream/read errors, including length mismatches.
    pub async fn collect(self) -> io::Result<Bytes> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Bytes(b) => Ok(b),
            Self::Stream(mut s) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = s.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
            Self::Reader(mut r) => read_to_bytes(&mut r),
        }
    }

    /// Reads the whole body into memory on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` for async stream bodies, otherwise propagates
    /// read errors, including length mismatches.
    pub fn collect_blocking(self) -> io::Result<Bytes> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Bytes(b) => Ok(b),
            Self::Stream(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "async stream body cannot be read on the blocking path",
            )),
            Self::Reader(mut r) => read_to_bytes(&mut r),
        }
    }

    /// Consumes and discards the body so the underlying connection is released.
    ///
    /// # Errors
    ///
    /// Propagates stream/read errors.
    pub async fn drain(self) -> io::Result<()> {
        match self {
            Self::Stream(mut s) => {
                while let Some(chunk) = s.next().await {
                    chunk?;
                }
                Ok(())
            }
            other => other.drain_blocking(),
        }
    }

    /// Blocking counterpart of [`drain`](Self::drain). An async stream body is
    /// dropped unread, which closes it.
    ///
    /// # Errors
    ///
    /// Propagates read errors.
    pub fn drain_blocking(self) -> io::Result<()> {
        match self {
            Self::Empty | Self::Bytes(_) | Self::Stream(_) => Ok(()),
            Self::Reader(mut r) => io::copy(&mut r, &mut io::sink()).map(|_| ()),
        }
    }

    /// Converts the body into an async byte stream.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` for blocking `Reader` bodies.
    pub fn into_stream(self) -> io::Result<ByteStream> {
        match self {
            Self::Empty => Ok(Box::pin(stream::empty::<io::Result<Bytes>>())),
            Self::Bytes(b) => Ok(Box::pin(stream::once(async move { Ok::<_, io::Error>(b) }))),
            Self::Stream(s) => Ok(s),
            Self::Reader(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "blocking reader body cannot be exposed as an async stream",
            )),
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Self::Stream(_) => f.write_str("Stream"),
            Self::Reader(_) => f.write_str("Reader"),
        }
    }
}

fn read_to_bytes(reader: &mut ByteReader) -> io::Result<Bytes> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(Bytes::from(buf))
}

// ---------------------------------------------------------------------------
// BinaryData
// ---------------------------------------------------------------------------

/// Lazy view over a response body; nothing is read until asked for.
///
/// For streaming media types the view never buffers: it can be consumed once.
/// For other types the first materialization is cached and repeat reads are
/// served from memory.
#[derive(Debug)]
pub struct BinaryData {
    state: BinaryState,
    content_type: Option<String>,
    length: Option<u64>,
    buffered: bool,
}

#[derive(Debug)]
enum BinaryState {
    Pending(ResponseBody),
    Materialized(Bytes),
    Consumed,
}

impl BinaryData {
    /// Wraps a response body that is read on first access.
    #[must_use]
    pub fn new(body: ResponseBody, content_type: Option<String>, length: Option<u64>) -> Self {
        let buffered = !content_type.as_deref().is_some_and(is_streaming_media_type);
        Self {
            state: BinaryState::Pending(body),
            content_type,
            length,
            buffered,
        }
    }

    /// Whether reads are cached in memory.
    #[must_use]
    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    /// Response `Content-Type`, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Declared length from the response, if any.
    #[must_use]
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Materializes the bytes on the non-blocking path.
    ///
    /// # Errors
    ///
    /// Fails if the body was already consumed without buffering, or on read errors.
    pub async fn to_bytes(&mut self) -> io::Result<Bytes> {
        match std::mem::replace(&mut self.state, BinaryState::Consumed) {
            BinaryState::Pending(body) => {
                let bytes = body.collect().await?;
                self.remember(&bytes);
                Ok(bytes)
            }
            state => self.replay(state),
        }
    }

    /// Materializes the bytes on the blocking path.
    ///
    /// # Errors
    ///
    /// Fails if the body was already consumed without buffering, or on read errors.
    pub fn to_bytes_blocking(&mut self) -> io::Result<Bytes> {
        match std::mem::replace(&mut self.state, BinaryState::Consumed) {
            BinaryState::Pending(body) => {
                let bytes = body.collect_blocking()?;
                self.remember(&bytes);
                Ok(bytes)
            }
            state => self.replay(state),
        }
    }

    /// Hands out the underlying body without reading it.
    ///
    /// # Errors
    ///
    /// Fails if the body was already consumed without buffering.
    pub fn into_body(self) -> io::Result<ResponseBody> {
        match self.state {
            BinaryState::Pending(body) => Ok(body),
            BinaryState::Materialized(bytes) => Ok(ResponseBody::Bytes(bytes)),
            BinaryState::Consumed => Err(consumed()),
        }
    }

    fn remember(&mut self, bytes: &Bytes) {
        if self.buffered {
            self.state = BinaryState::Materialized(bytes.clone());
        }
    }

    fn replay(&mut self, state: BinaryState) -> io::Result<Bytes> {
        match state {
            BinaryState::Materialized(bytes) => {
                self.state = BinaryState::Materialized(bytes.clone());
                Ok(bytes)
            }
            _ => Err(consumed()),
        }
    }
}

fn consumed() -> io::Error {
    io::Error::other("unbuffered binary body was already consumed")
}

/// Whether `content_type` names a media type that must not be buffered.
#[must_use]
pub fn is_streaming_media_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    STREAMING_MEDIA_TYPES
        .iter()
        .any(|t| if t.ends_with('/') { essence.starts_with(t) } else { essence == *t })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn request_body_known_lengths() {
        assert_eq!(RequestBody::Empty.known_length(), Some(0));
        assert_eq!(RequestBody::Bytes(Bytes::from_static(b"abc")).known_length(), Some(3));
        let reader = RequestBody::Reader {
            reader: Box::new(Cursor::new(vec![0u8; 4])),
            length: None,
        };
        assert_eq!(reader.known_length(), None);
    }

    #[test]
    fn buffered_request_body_mismatch_is_immediate() {
        let err = RequestBody::Bytes(Bytes::from_static(b"abc"))
            .validate_length(5)
            .unwrap_err();
        assert_eq!(err, LengthMismatch::TooSmall { actual: 3, expected: 5 });
    }

    #[test]
    fn reader_request_body_mismatch_surfaces_on_read() {
        let body = RequestBody::Reader {
            reader: Box::new(Cursor::new(vec![0u8; 6])),
            length: None,
        }
        .validate_length(5)
        .unwrap();
        let RequestBody::Reader { mut reader, length } = body else {
            panic!("expected reader body");
        };
        assert_eq!(length, Some(5));
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert!(LengthMismatch::find(&err).is_some());
    }

    #[test]
    fn collect_blocking_rejects_async_stream() {
        let body = ResponseBody::Stream(Box::pin(stream::empty::<io::Result<Bytes>>()));
        assert_eq!(
            body.collect_blocking().unwrap_err().kind(),
            io::ErrorKind::Unsupported
        );
    }

    #[test]
    fn drain_blocking_consumes_reader() {
        let body = ResponseBody::Reader(Box::new(Cursor::new(vec![1u8; 128])));
        body.drain_blocking().unwrap();
    }

    #[tokio::test]
    async fn collect_joins_stream_chunks() {
        let chunks: Vec<io::Result<Bytes>> = vec![Ok(Bytes::from_static(b"he")), Ok(Bytes::from_static(b"llo"))];
        let body = ResponseBody::Stream(Box::pin(stream::iter(chunks)));
        assert_eq!(body.collect().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn streaming_media_types() {
        assert!(is_streaming_media_type("application/octet-stream"));
        assert!(is_streaming_media_type("text/event-stream; charset=utf-8"));
        assert!(is_streaming_media_type("video/mp4"));
        assert!(!is_streaming_media_type("application/json"));
        assert!(!is_streaming_media_type("image/png"));
    }

    #[test]
    fn buffered_binary_data_replays() {
        let mut data = BinaryData::new(
            ResponseBody::Bytes(Bytes::from_static(b"png")),
            Some("image/png".into()),
            Some(3),
        );
        assert!(data.is_buffered());
        assert_eq!(data.to_bytes_blocking().unwrap(), Bytes::from_static(b"png"));
        assert_eq!(data.to_bytes_blocking().unwrap(), Bytes::from_static(b"png"));
    }

    #[test]
    fn streaming_binary_data_reads_once() {
        let mut data = BinaryData::new(
            ResponseBody::Reader(Box::new(Cursor::new(b"raw".to_vec()))),
            Some("application/octet-stream".into()),
            None,
        );
        assert!(!data.is_buffered());
        assert_eq!(data.to_bytes_blocking().unwrap(), Bytes::from_static(b"raw"));
        assert!(data.to_bytes_blocking().is_err());
    }
}
