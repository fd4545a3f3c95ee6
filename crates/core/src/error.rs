//! Unified error types for pagecache.
//!
//! Every variant maps onto one of three kinds (see [`ErrorKind`]): a miss,
//! a failed operation, or unusable caller input.

use std::fmt;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The key is absent or its entry has just expired.
    Miss,

    /// A store, delete, purge, or (de)serialization step failed.
    OperationFailed,

    /// The caller supplied something the cache cannot work with.
    InvalidInput,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Miss => f.write_str("not found"),
            ErrorKind::OperationFailed => f.write_str("operation failed"),
            ErrorKind::InvalidInput => f.write_str("invalid input"),
        }
    }
}

/// Unified error types for the cache engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No cache entry found for the given key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// The entry existed but had expired and was removed.
    #[error("CACHE_MISS: entry expired: {0}")]
    Expired(String),

    /// Invalid input (e.g. a response without its originating request).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Stored bytes could not be parsed back into an HTTP message.
    #[error("MALFORMED: {0}")]
    Malformed(String),

    /// An entry was loaded under a key other than the one it was stored with.
    #[error("CACHE_ERROR: key mismatch (expected {expected}, got {actual})")]
    KeyMismatch { expected: String, actual: String },

    /// Any other backend failure.
    #[error("CACHE_ERROR: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::CacheMiss(_) | Error::Expired(_) => ErrorKind::Miss,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Malformed(_) | Error::KeyMismatch { .. } | Error::OperationFailed(_) => ErrorKind::OperationFailed,
        }
    }

    /// Shorthand for `self.kind() == ErrorKind::Miss`.
    pub fn is_miss(&self) -> bool {
        self.kind() == ErrorKind::Miss
    }
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Error::Malformed(err.to_string())
    }
}
