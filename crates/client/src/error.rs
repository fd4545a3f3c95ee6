//! Errors returned by the caching client.

use crate::request::UrlError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The cache itself failed (not a miss).
    #[error(transparent)]
    Cache(#[from] pagecache_core::Error),

    /// The upstream request could not be completed.
    #[error("TRANSPORT: {0}")]
    Transport(String),

    #[error("INVALID_URL: {0}")]
    InvalidUrl(#[from] UrlError),
}
