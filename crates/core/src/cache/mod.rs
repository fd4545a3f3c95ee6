//! Cache storage: the backend contract, entries, keys, and wire format.
//!
//! Backends implement [`Cache`]. The in-memory [`MemoryCache`] is the
//! reference implementation; it stores each exchange as serialized
//! HTTP/1.x bytes inside an [`Entry`] and evicts expired entries,
//! least-frequently-used first.

pub mod entry;
pub mod key;
pub mod memory;
pub mod wire;

use chrono::TimeDelta;

use crate::Error;
use crate::exchange::Exchange;
use crate::policy::Policy;

pub use entry::{DEFAULT_ENTRY_SIZE, Entry};
pub use key::{DEFAULT_CACHE_NAME, compute_cache_key};
pub use memory::{DEFAULT_CAPACITY, MemoryCache, UNBOUNDED_CAPACITY};

/// Storage for HTTP exchanges.
///
/// Every operation is synchronous. A rejected `set` (the policy says the
/// response is not cacheable) succeeds without storing anything.
pub trait Cache: Send + Sync {
    /// Retrieve the exchange stored under `key`.
    ///
    /// # Errors
    ///
    /// A miss (absent or expired) is reported as an error whose
    /// [`kind`](Error::kind) is `ErrorKind::Miss`.
    fn get(&self, key: &str) -> Result<Exchange, Error>;

    /// Store `exchange` under `key` for `ttl`, if the policy allows it.
    fn set(&self, key: &str, exchange: &Exchange, ttl: TimeDelta) -> Result<(), Error>;

    /// Remove the entry under `key`.
    fn delete(&self, key: &str) -> Result<(), Error>;

    /// The policy this cache admits responses with.
    fn policy(&self) -> &Policy;

    /// Remove every entry.
    fn purge(&self) -> Result<(), Error>;
}
