//! Per-call error taxonomy.

use std::error::Error as StdError;
use std::io;

use wirebind_core::{
    AssemblyError, DecodeError, LengthMismatch, RegistrationError, ServiceError,
};

/// Failure inside a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0} request bodies are not supported on this path")]
    UnsupportedBody(&'static str),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("http client error: {0}")]
    Client(#[source] Box<dyn StdError + Send + Sync>),
}

/// Everything a call can fail with.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error("failed to assemble request: {0}")]
    Assembly(#[from] AssemblyError),
    #[error("transport failed: {0}")]
    Transport(TransportError),
    #[error(transparent)]
    Length(#[from] LengthMismatch),
    #[error("body i/o failed: {0}")]
    Io(io::Error),
    /// The status code was not expected; carries the materialized error.
    #[error(transparent)]
    Status(Box<ServiceError>),
    #[error("failed to decode response: {0}")]
    Decode(#[from] DecodeError),
    #[error("invocation was cancelled")]
    Cancelled,
    #[error("decode task failed: {0}")]
    DecodeTask(String),
}

impl InvokeError {
    /// The materialized service error, for unexpected status codes.
    #[must_use]
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::Status(err) => Some(err),
            _ => None,
        }
    }

    /// Short label for metrics and span fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Registration(_) => "registration",
            Self::Assembly(_) => "assembly",
            Self::Transport(_) => "transport",
            Self::Length(_) => "length",
            Self::Io(_) => "io",
            Self::Status(_) => "status",
            Self::Decode(_) => "decode",
            Self::Cancelled => "cancelled",
            Self::DecodeTask(_) => "decode_task",
        }
    }
}

impl From<io::Error> for InvokeError {
    fn from(err: io::Error) -> Self {
        match LengthMismatch::find(&err) {
            Some(mismatch) => Self::Length(mismatch),
            None => Self::Io(err),
        }
    }
}

/// Length mismatches raised while a transport reads the request body are
/// reported as such, not as transport failures.
impl From<TransportError> for InvokeError {
    fn from(err: TransportError) -> Self {
        let found = match &err {
            TransportError::Io(io_err) => LengthMismatch::find(io_err),
            other => find_length_mismatch(other),
        };
        match found {
            Some(mismatch) => Self::Length(mismatch),
            None => Self::Transport(err),
        }
    }
}

impl From<ServiceError> for InvokeError {
    fn from(err: ServiceError) -> Self {
        Self::Status(Box::new(err))
    }
}

fn find_length_mismatch(err: &(dyn StdError + 'static)) -> Option<LengthMismatch> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(mismatch) = e.downcast_ref::<LengthMismatch>() {
            return Some(*mismatch);
        }
        if let Some(found) = e.downcast_ref::<io::Error>().and_then(LengthMismatch::find) {
            return Some(found);
        }
        current = e.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_carrying_mismatch_becomes_length_error() {
        let io_err: io::Error = LengthMismatch::TooLarge { actual: 6, expected: 5 }.into();
        assert!(matches!(
            InvokeError::from(io_err),
            InvokeError::Length(LengthMismatch::TooLarge { actual: 6, expected: 5 })
        ));
    }

    #[test]
    fn nested_transport_mismatch_is_unwrapped() {
        let io_err: io::Error = LengthMismatch::TooSmall { actual: 1, expected: 5 }.into();
        let transport = TransportError::Client(Box::new(io_err));
        assert!(matches!(InvokeError::from(transport), InvokeError::Length(_)));
    }

    #[test]
    fn plain_transport_error_stays_transport() {
        let err = InvokeError::from(TransportError::InvalidRequest("bad url".into()));
        assert_eq!(err.kind(), "transport");
    }
}
