//! Core types for pagecache, a policy-driven HTTP response cache.
//!
//! This crate provides:
//! - Cacheability policy with include/exclude rules
//! - Cache keys, entries, and their HTTP/1.x wire format
//! - The `Cache` trait and an in-memory backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod exchange;
pub mod policy;

pub use cache::{Cache, DEFAULT_CACHE_NAME, Entry, MemoryCache, compute_cache_key};
pub use config::{CacheConfig, ConfigError};
pub use error::{Error, ErrorKind};
pub use exchange::Exchange;
pub use policy::{Behavior, PatternCompiler, PatternFlags, Policy, Rule};
