//! Error types for the throttler.

use thiserror::Error;

/// Errors raised while building a throttler.
///
/// None of these can occur once a [`ThrottlingTransport`](crate::throttle::ThrottlingTransport)
/// exists; they are all detected at construction time.
#[derive(Error, Debug)]
pub enum ThrottleError {
    /// Invalid numeric settings or an unparseable configuration document
    #[error("Configuration error: {0}")]
    Config(String),

    /// A path prefix pattern failed to compile after wildcard substitution
    #[error("Invalid path prefix pattern {pattern:?}: {source}")]
    Pattern {
        /// The pattern as written in the configuration
        pattern: String,
        /// The underlying regex compilation error
        #[source]
        source: regex::Error,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for throttler construction.
pub type Result<T> = std::result::Result<T, ThrottleError>;

/// Errors returned by a throttled send.
///
/// `E` is the error type of the wrapped transport. Delegate failures are
/// carried through as-is in [`SendError::Delegate`].
#[derive(Error, Debug)]
pub enum SendError<E> {
    /// A throttled request found no free slot and over-queueing is disallowed
    #[error("unable to make request: over-queueing disallowed")]
    OverqueueRejected,

    /// The caller gave up while the request was waiting for its slot
    #[error("request cancelled while waiting for a throttling slot")]
    Cancelled,

    /// The wrapped transport failed
    #[error(transparent)]
    Delegate(E),
}

impl<E> SendError<E> {
    /// Whether the request was rejected because over-queueing is disallowed.
    pub fn is_overqueue(&self) -> bool {
        matches!(self, SendError::OverqueueRejected)
    }

    /// Whether the request was cancelled before it was forwarded.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SendError::Cancelled)
    }

    /// The delegate's error, if this is one.
    pub fn into_delegate(self) -> Option<E> {
        match self {
            SendError::Delegate(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_overqueue_message() {
        let err: SendError<std::io::Error> = SendError::OverqueueRejected;
        assert!(err.is_overqueue());
        assert!(!err.is_cancelled());
        assert_eq!(
            err.to_string(),
            "unable to make request: over-queueing disallowed"
        );
    }

    #[test]
    fn test_delegate_error_is_transparent() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = SendError::Delegate(inner);

        assert_eq!(err.to_string(), "refused");
        assert!(!err.is_overqueue());
        let inner = err.into_delegate().unwrap();
        assert_eq!(inner.kind(), std::io::ErrorKind::ConnectionRefused);
    }

    #[test]
    fn test_pattern_error_keeps_source() {
        let source = regex::Regex::new("^(").unwrap_err();
        let err = ThrottleError::Pattern {
            pattern: "(".to_string(),
            source,
        };
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("Invalid path prefix pattern \"(\""));
    }
}
