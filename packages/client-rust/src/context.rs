//! Per-call invocation context.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Short-lived state for one call: request id, cancellation, and free-form
/// attributes passed through to the transport.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub request_id: Uuid,
    pub cancellation: CancellationToken,
    pub attributes: BTreeMap<String, String>,
}

impl InvocationContext {
    /// A fresh context with a random request id and its own token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            cancellation: CancellationToken::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Ties the call to an existing token, typically a child of a wider scope.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Adds a free-form attribute the transport can read.
    #[must_use]
    pub fn attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Whether the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Default for InvocationContext {
    fn default() -> Self {
        Self::new()
    }
}
