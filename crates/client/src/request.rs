//! Building upstream requests from user-supplied URLs.

use bytes::Bytes;
use http::{Method, Request};

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string before it is keyed.
///
/// Surrounding whitespace is trimmed, a missing scheme defaults to
/// `https`, and the fragment is dropped. The host is lowercased by the
/// parser; the query string is left untouched.
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let raw = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };
    let mut parsed = url::Url::parse(&raw).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_fragment(None);
    Ok(parsed)
}

/// Build an empty-bodied GET request for `input`.
pub fn get_request(input: &str) -> Result<Request<Bytes>, UrlError> {
    let url = canonicalize(input)?;
    Request::builder()
        .method(Method::GET)
        .uri(url.as_str())
        .body(Bytes::new())
        .map_err(|e| UrlError::InvalidUrl(e.to_string()))
}
