//! Unified error type.

use std::fmt;

/// The error type returned by torii's fallible operations.
///
/// Only infrastructure failures surface here: binding a listener, accepting a
/// connection, or walking a locale directory. Anything a client can cause,
/// such as a malformed body or a failed field rule, is expressed as an HTTP
/// [`Response`](crate::Response), never as an `Error`.
#[derive(Debug)]
pub enum Error {
    /// An I/O failure from the listener or the locale loader.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
