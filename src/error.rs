//! The error taxonomy shared by every subsystem in this crate.

use std::fmt;
use std::io;
use std::sync::Arc;

/// The closed set of failure kinds a runtime operation can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    InvalidArgument,
    NotReady,
    Timeout,
    Canceled,
    Closed,
    Overflow,
    Stopped,
    QueueFull,
    Rejected,
    NotSupported,
    Io,
}

impl ErrorKind {
    /// The stable numeric tag for this kind.
    #[must_use]
    pub const fn tag(self) -> u32 {
        match self {
            ErrorKind::InvalidArgument => 1,
            ErrorKind::NotReady => 2,
            ErrorKind::Timeout => 3,
            ErrorKind::Canceled => 4,
            ErrorKind::Closed => 5,
            ErrorKind::Overflow => 6,
            ErrorKind::Stopped => 7,
            ErrorKind::QueueFull => 8,
            ErrorKind::Rejected => 9,
            ErrorKind::NotSupported => 10,
            ErrorKind::Io => 11,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotReady => "not_ready",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Canceled => "canceled",
            ErrorKind::Closed => "closed",
            ErrorKind::Overflow => "overflow",
            ErrorKind::Stopped => "stopped",
            ErrorKind::QueueFull => "queue_full",
            ErrorKind::Rejected => "rejected",
            ErrorKind::NotSupported => "not_supported",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}

/// Wraps a shared `io::Error` so it can sit behind `#[source]`: `io::Error`
/// itself isn't `Clone`, and `Arc<io::Error>` alone doesn't implement
/// `std::error::Error`.
#[derive(Debug, Clone)]
struct IoSource(Arc<io::Error>);

impl fmt::Display for IoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for IoSource {}

/// The single error value threaded through every fallible operation in this
/// crate.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: Arc<str>,
    #[source]
    source: Option<IoSource>,
}

impl Error {
    /// Build an error value from a kind and a human-readable message.
    pub fn new(kind: ErrorKind, message: impl Into<Arc<str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Shorthand for `Error::new(ErrorKind::Canceled, "operation canceled")`.
    #[must_use]
    pub fn canceled() -> Self {
        Self::new(ErrorKind::Canceled, "operation canceled")
    }

    #[must_use]
    pub fn closed() -> Self {
        Self::new(ErrorKind::Closed, "channel closed")
    }

    #[must_use]
    pub fn stopped() -> Self {
        Self::new(ErrorKind::Stopped, "runtime stopped")
    }

    #[must_use]
    pub fn not_supported(what: impl Into<Arc<str>>) -> Self {
        Self::new(ErrorKind::NotSupported, what)
    }

    #[must_use]
    pub fn io(err: io::Error) -> Self {
        let message: Arc<str> = Arc::from(err.to_string());
        Self {
            kind: ErrorKind::Io,
            message,
            source: Some(IoSource(Arc::new(err))),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = Error::new(ErrorKind::Timeout, "boom");
        assert_eq!(err.to_string(), "timeout: boom");
    }

    #[test]
    fn io_error_preserves_source() {
        use std::error::Error as _;
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = Error::from(io_err);
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.source().is_some());
    }
}
