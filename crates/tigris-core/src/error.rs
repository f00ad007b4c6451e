//! Common error type definitions.

use strum::{AsRefStr, IntoStaticStr};
use thiserror::Error;

/// Type alias for boxed dynamic errors that can be sent across threads.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for Results with our custom Error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Categories of errors raised by the scope machinery itself.
///
/// All of these are programmer errors: none of them is retryable and none is
/// ever corrected automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// A scope was popped with a token that is not the top of its stack.
    OrderingViolation,
    /// A descriptor was built with fields that do not fit its kind.
    InvalidDescriptor,
    /// The pre-send interceptor could not apply headers to a request.
    HeaderInjection,
}

/// A structured error type for scope operations.
#[derive(Debug, Error)]
#[error("{kind:?}{}", message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
#[must_use = "errors should be handled appropriately"]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional error message.
    pub message: Option<String>,
    /// Optional source error.
    #[source]
    pub source: Option<BoxedError>,
}

impl Error {
    /// Creates a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Adds a message to this error.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a source error to this error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Creates a new ordering violation error.
    pub fn ordering_violation() -> Self {
        Self::new(ErrorKind::OrderingViolation)
    }

    /// Creates a new invalid descriptor error.
    pub fn invalid_descriptor() -> Self {
        Self::new(ErrorKind::InvalidDescriptor)
    }

    /// Creates a new header injection error.
    pub fn header_injection() -> Self {
        Self::new(ErrorKind::HeaderInjection)
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error kind as a string.
    pub fn kind_str(&self) -> &'static str {
        self.kind.into()
    }

    /// Returns whether this error signals mismatched scope nesting.
    pub fn is_ordering_violation(&self) -> bool {
        self.kind == ErrorKind::OrderingViolation
    }

    /// Returns whether this error signals a malformed descriptor.
    pub fn is_invalid_descriptor(&self) -> bool {
        self.kind == ErrorKind::InvalidDescriptor
    }
}
