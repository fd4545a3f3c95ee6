//! Client code for pagecache.
//!
//! This crate puts a [`pagecache_core::Cache`] in front of an HTTP
//! transport: requests are keyed, served from the cache when possible, and
//! otherwise sent upstream with cacheable responses stored on the way back.

pub mod caching;
pub mod error;
pub mod request;
pub mod transport;

pub use caching::{CacheStats, CacheStatus, CachingClient, Fetched};
pub use error::ClientError;
pub use request::{UrlError, canonicalize, get_request};
pub use transport::{ReqwestTransport, Transport, TransportConfig};
