//! Cache entries: a serialized exchange plus expiry and access metadata.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;

use super::wire;
use crate::Error;
use crate::exchange::Exchange;

/// Size charged for an entry unless the caller sets one, so that a
/// capacity counts entries by default.
pub const DEFAULT_ENTRY_SIZE: u64 = 1;

/// A single cached exchange.
///
/// Frequency and size are atomics so concurrent readers can bump them
/// without holding the owning cache's map lock.
#[derive(Debug)]
pub struct Entry {
    key: String,
    expiration: RwLock<Option<DateTime<Utc>>>,
    request: Bytes,
    response: Bytes,
    size: AtomicU64,
    frequency: AtomicU64,
}

impl Entry {
    /// Serialize `exchange` into a new entry stored under `key`.
    ///
    /// `expiration` of `None` means the entry never expires.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the key is empty or the exchange
    /// cannot be serialized (see [`wire::save`]).
    pub fn new(key: impl Into<String>, exchange: &Exchange, expiration: Option<DateTime<Utc>>) -> Result<Self, Error> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::InvalidInput("key must not be empty".into()));
        }

        let (request, response) = wire::save(exchange)?;
        Ok(Self::from_parts(key, request, response, expiration))
    }

    /// Rebuild an entry from raw wire bytes, e.g. when a backend reads
    /// entries back from its own storage.
    pub fn from_parts(
        key: impl Into<String>,
        request: Bytes,
        response: Bytes,
        expiration: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            key: key.into(),
            expiration: RwLock::new(expiration),
            request,
            response,
            size: AtomicU64::new(DEFAULT_ENTRY_SIZE),
            frequency: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        *self.expiration.read()
    }

    /// Raw request bytes.
    pub fn request_bytes(&self) -> &Bytes {
        &self.request
    }

    /// Raw response bytes.
    pub fn response_bytes(&self) -> &Bytes {
        &self.response
    }

    /// Deserialize the stored exchange.
    ///
    /// # Errors
    ///
    /// Returns `Error::KeyMismatch` if `key` is not this entry's key, or
    /// `Error::Malformed` if the stored bytes do not parse.
    pub fn load(&self, key: &str) -> Result<Exchange, Error> {
        if key != self.key {
            return Err(Error::KeyMismatch { expected: self.key.clone(), actual: key.to_string() });
        }
        wire::load(&self.request, &self.response)
    }

    /// Record a read. Returns the updated frequency.
    pub fn access(&self) -> u64 {
        self.frequency.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn frequency(&self) -> u64 {
        self.frequency.load(Ordering::Relaxed)
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    /// Charge `size` against cache capacity instead of the default.
    pub fn with_size(self, size: u64) -> Self {
        self.set_size(size);
        self
    }

    /// Only the owning cache may resize a stored entry, under its write
    /// lock, so that its running total stays equal to the sum of sizes.
    /// Callers go through `MemoryCache::resize`.
    pub(crate) fn set_size(&self, size: u64) {
        self.size.store(size, Ordering::Relaxed);
    }

    /// Expire `ttl` from now.
    pub fn set_ttl(&self, ttl: TimeDelta) {
        self.set_expiration(Utc::now().checked_add_signed(ttl));
    }

    pub fn set_expiration(&self, expiration: Option<DateTime<Utc>>) {
        *self.expiration.write() = expiration;
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiration() {
            Some(expiration) => now >= expiration,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Request, Response, StatusCode};

    fn exchange() -> Exchange {
        let request = Request::builder().uri("http://example.com/").body(Bytes::new()).unwrap();
        let response = Response::builder().status(200).body(Bytes::from_static(b"Hello, World!")).unwrap();
        Exchange::new(request, response)
    }

    fn valid_entry() -> Entry {
        Entry::new("testkey", &exchange(), Some(Utc::now() + TimeDelta::minutes(10))).unwrap()
    }

    #[test]
    fn test_new_entry() {
        let expiration = Utc::now() + TimeDelta::minutes(10);
        let entry = Entry::new("testkey", &exchange(), Some(expiration)).unwrap();
        assert_eq!(entry.key(), "testkey");
        assert_eq!(entry.expiration(), Some(expiration));
        assert_eq!(entry.size(), DEFAULT_ENTRY_SIZE);
        assert_eq!(entry.frequency(), 0);
        assert!(!entry.request_bytes().is_empty());
        assert!(!entry.response_bytes().is_empty());
    }

    #[test]
    fn test_new_entry_empty_key() {
        let result = Entry::new("", &exchange(), None);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_new_entry_without_request() {
        let response = Response::builder().status(200).body(Bytes::new()).unwrap();
        let result = Entry::new("testkey", &Exchange::without_request(response), None);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_load() {
        let entry = valid_entry();
        let loaded = entry.load("testkey").unwrap();
        assert_eq!(loaded.status(), StatusCode::OK);
        assert_eq!(loaded.body().as_ref(), b"Hello, World!");
    }

    #[test]
    fn test_load_wrong_key() {
        let entry = valid_entry();
        assert!(matches!(entry.load("wrongkey"), Err(Error::KeyMismatch { .. })));
    }

    #[test]
    fn test_load_malformed_bytes() {
        let entry = Entry::from_parts("k", Bytes::from_static(b"GET"), Bytes::from_static(b"HTTP/1.1"), None);
        assert!(matches!(entry.load("k"), Err(Error::Malformed(_))));
    }

    #[test]
    fn test_access() {
        for times in [0u64, 1, 5] {
            let entry = valid_entry();
            for _ in 0..times {
                entry.access();
            }
            assert_eq!(entry.frequency(), times);
        }
        assert_eq!(valid_entry().access(), 1);
    }

    #[test]
    fn test_set_size() {
        let entry = valid_entry();
        for size in [0, 1024, 1024 * 1024 * 1024] {
            entry.set_size(size);
            assert_eq!(entry.size(), size);
        }
    }

    #[test]
    fn test_set_ttl() {
        let entry = valid_entry();
        entry.set_ttl(TimeDelta::hours(48));
        let expected = Utc::now() + TimeDelta::hours(48);
        let actual = entry.expiration().unwrap();
        assert!((expected - actual).abs() < TimeDelta::seconds(1));
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let entry = valid_entry();
        entry.set_expiration(Some(now));
        assert!(entry.is_expired_at(now));
        assert!(!entry.is_expired_at(now - TimeDelta::milliseconds(1)));

        entry.set_ttl(TimeDelta::seconds(-1));
        assert!(entry.is_expired());

        entry.set_expiration(None);
        assert!(!entry.is_expired_at(now + TimeDelta::days(365 * 100)));
    }
}
