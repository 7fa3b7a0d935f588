//! Length-validating wrappers for request and response bodies.
//!
//! Both wrappers count every byte that passes through. Exceeding the declared
//! length fails on the read that crosses it; reaching end-of-data short of the
//! declared length fails at that point. Exact equality is the only clean
//! outcome.
//!
//! Errors surface through `std::io::Error` (kind `InvalidData`) carrying a
//! [`LengthMismatch`]; use [`LengthMismatch::find`] to recover it.

use std::io::{self, Read, Seek, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

/// Declared vs. observed body length disagreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LengthMismatch {
    #[error("body too large: read {actual} bytes, expected {expected}")]
    TooLarge { actual: u64, expected: u64 },
    #[error("body too small: read {actual} bytes, expected {expected}")]
    TooSmall { actual: u64, expected: u64 },
}

impl LengthMismatch {
    /// Recovers a `LengthMismatch` wrapped inside an I/O error, if any.
    #[must_use]
    pub fn find(err: &io::Error) -> Option<Self> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<LengthMismatch>())
            .copied()
    }

    /// Compares an already-known length against the declared one.
    ///
    /// # Errors
    ///
    /// Returns the mismatch when `actual != expected`.
    pub fn check(actual: u64, expected: u64) -> Result<(), Self> {
        match actual.cmp(&expected) {
            std::cmp::Ordering::Equal => Ok(()),
            std::cmp::Ordering::Greater => Err(Self::TooLarge { actual, expected }),
            std::cmp::Ordering::Less => Err(Self::TooSmall { actual, expected }),
        }
    }
}

impl From<LengthMismatch> for io::Error {
    fn from(err: LengthMismatch) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

// ---------------------------------------------------------------------------
// LengthValidatingReader
// ---------------------------------------------------------------------------

/// Blocking wrapper enforcing a declared byte length over a [`Read`] source.
///
/// Access is `&mut self`, so a single reader at a time is guaranteed by the
/// borrow checker and the position counter needs no further synchronization.
#[derive(Debug)]
pub struct LengthValidatingReader<R> {
    inner: R,
    expected: u64,
    position: u64,
    mark: Option<Mark>,
}

#[derive(Debug, Clone, Copy)]
struct Mark {
    position: u64,
    offset: u64,
}

impl<R> LengthValidatingReader<R> {
    /// Wraps `inner`, which must yield exactly `expected` bytes.
    pub fn new(inner: R, expected: u64) -> Self {
        Self {
            inner,
            expected,
            position: 0,
            mark: None,
        }
    }

    /// Bytes counted so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Byte count the source must reach.
    #[must_use]
    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// Unwraps the reader, dropping the count.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> LengthValidatingReader<R> {
    /// Reads and discards up to `n` bytes, counting them like any other read.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors, including length mismatches.
    pub fn skip(&mut self, n: u64) -> io::Result<u64> {
        io::copy(&mut self.by_ref().take(n), &mut io::sink())
    }
}

impl<R: Read + Seek> LengthValidatingReader<R> {
    /// Remembers the current position of both the source and the counter.
    ///
    /// # Errors
    ///
    /// Fails if the source cannot report its position.
    pub fn mark(&mut self) -> io::Result<()> {
        let offset = self.inner.stream_position()?;
        self.mark = Some(Mark {
            position: self.position,
            offset,
        });
        Ok(())
    }

    /// Rewinds the source to the last mark and restores the counter with it.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidInput` if no mark was set, or if seeking fails.
    pub fn reset(&mut self) -> io::Result<()> {
        let Some(mark) = self.mark else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "reset without mark"));
        };
        self.inner.seek(SeekFrom::Start(mark.offset))?;
        self.position = mark.position;
        Ok(())
    }
}

impl<R: Read> Read for LengthValidatingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        if self.position > self.expected {
            return Err(LengthMismatch::TooLarge {
                actual: self.position,
                expected: self.expected,
            }
            .into());
        }
        if n == 0 && self.position < self.expected {
            return Err(LengthMismatch::TooSmall {
                actual: self.position,
                expected: self.expected,
            }
            .into());
        }
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// LengthValidatingStream
// ---------------------------------------------------------------------------

/// Non-blocking counterpart of [`LengthValidatingReader`] over a byte stream.
///
/// After yielding a mismatch error the stream is fused and returns `None`.
/// Dropping the wrapper drops the inner stream, releasing its connection.
pub struct LengthValidatingStream<S> {
    inner: S,
    expected: u64,
    position: u64,
    finished: bool,
}

impl<S> LengthValidatingStream<S> {
    /// Wraps `inner`, which must yield exactly `expected` bytes before ending.
    pub fn new(inner: S, expected: u64) -> Self {
        Self {
            inner,
            expected,
            position: 0,
            finished: false,
        }
    }

    /// Bytes yielded so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<S> Stream for LengthValidatingStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        let this = &mut *self;
        match this.inner.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                this.position += chunk.len() as u64;
                if this.position > this.expected {
                    this.finished = true;
                    return Poll::Ready(Some(Err(LengthMismatch::TooLarge {
                        actual: this.position,
                        expected: this.expected,
                    }
                    .into())));
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => {
                this.finished = true;
                if this.position < this.expected {
                    Poll::Ready(Some(Err(LengthMismatch::TooSmall {
                        actual: this.position,
                        expected: this.expected,
                    }
                    .into())))
                } else {
                    Poll::Ready(None)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
