//! In-memory cache backend.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::{Cache, Entry};
use crate::Error;
use crate::exchange::Exchange;
use crate::policy::Policy;

/// Capacity used when none (zero) is given.
pub const DEFAULT_CAPACITY: u64 = 128;

/// Capacity sentinel that disables eviction.
pub const UNBOUNDED_CAPACITY: u64 = u64::MAX;

#[derive(Debug, Default)]
struct State {
    entries: FxHashMap<String, Arc<Entry>>,
    current_size: u64,
}

impl State {
    fn insert(&mut self, entry: Arc<Entry>) {
        self.current_size = self.current_size.saturating_add(entry.size());
        if let Some(replaced) = self.entries.insert(entry.key().to_string(), entry) {
            self.current_size = self.current_size.saturating_sub(replaced.size());
        }
    }

    fn remove(&mut self, key: &str) -> Option<Arc<Entry>> {
        let removed = self.entries.remove(key)?;
        self.current_size = self.current_size.saturating_sub(removed.size());
        Some(removed)
    }
}

/// Thread-safe in-memory cache with frequency-aware expiry eviction.
///
/// Reads share a lock; inserts, deletes, purges, and eviction take it
/// exclusively. Access counts live on the entries themselves, so a hit
/// never needs the exclusive lock unless it finds the entry expired.
#[derive(Debug)]
pub struct MemoryCache {
    state: RwLock<State>,
    policy: Policy,
    capacity: u64,
}

impl MemoryCache {
    /// Create a cache admitting responses by `policy` with the given size
    /// budget. A capacity of zero means [`DEFAULT_CAPACITY`].
    pub fn new(policy: Policy, capacity: u64) -> Self {
        let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
        Self { state: RwLock::new(State::default()), policy, capacity }
    }

    /// Create a cache that never runs eviction.
    pub fn unbounded(policy: Policy) -> Self {
        Self::new(policy, UNBOUNDED_CAPACITY)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Sum of the sizes of all stored entries.
    pub fn current_size(&self) -> u64 {
        self.state.read().current_size
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// The raw entry under `key`, expired or not. Does not count as an access.
    pub fn entry(&self, key: &str) -> Option<Arc<Entry>> {
        self.state.read().entries.get(key).cloned()
    }

    /// Store a caller-built entry under its own key, bypassing the policy,
    /// then run an eviction pass.
    pub fn insert_entry(&self, entry: Entry) {
        let mut state = self.state.write();
        state.insert(Arc::new(entry));
        self.evict_locked(&mut state, Utc::now());
    }

    /// Change the size charged for a stored entry.
    ///
    /// # Errors
    ///
    /// Returns `Error::CacheMiss` if `key` is absent.
    pub fn resize(&self, key: &str, size: u64) -> Result<(), Error> {
        let mut state = self.state.write();
        let entry = state.entries.get(key).cloned().ok_or_else(|| Error::CacheMiss(key.to_string()))?;
        state.current_size = state.current_size.saturating_sub(entry.size()).saturating_add(size);
        entry.set_size(size);
        Ok(())
    }

    /// Remove every expired entry regardless of capacity. Returns how many
    /// were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut state = self.state.write();
        let expired: Vec<String> =
            state.entries.iter().filter(|(_, entry)| entry.is_expired_at(now)).map(|(key, _)| key.clone()).collect();
        for key in &expired {
            state.remove(key);
        }
        expired.len()
    }

    /// Remove `seen` from under `key` unless the slot was replaced since it
    /// was read. Returns whether anything was removed.
    fn remove_if_current(&self, key: &str, seen: &Arc<Entry>) -> bool {
        let mut state = self.state.write();
        if !state.entries.get(key).is_some_and(|current| Arc::ptr_eq(current, seen)) {
            return false;
        }
        state.remove(key);
        tracing::debug!(key, "removed expired cache entry on read");
        true
    }

    /// Run an eviction pass now. Returns the evicted keys in removal order.
    pub fn evict(&self) -> Vec<String> {
        let mut state = self.state.write();
        self.evict_locked(&mut state, Utc::now())
    }

    /// Collects expired entries until a live entry is seen while the
    /// projected size is under capacity, then removes the collected ones
    /// in ascending frequency order (ties by key). Live entries are never
    /// evicted.
    fn evict_locked(&self, state: &mut State, now: DateTime<Utc>) -> Vec<String> {
        if self.capacity == UNBOUNDED_CAPACITY {
            return Vec::new();
        }

        let mut projected = state.current_size;
        let mut candidates: Vec<(u64, String)> = Vec::new();

        for (key, entry) in &state.entries {
            if entry.is_expired_at(now) {
                projected = projected.saturating_sub(entry.size());
                candidates.push((entry.frequency(), key.clone()));
                continue;
            }

            if projected < self.capacity {
                break;
            }
        }

        candidates.sort_unstable();

        let mut evicted = Vec::with_capacity(candidates.len());
        for (frequency, key) in candidates {
            if state.remove(&key).is_some() {
                tracing::debug!(key = %key, frequency, "evicted expired cache entry");
                evicted.push(key);
            }
        }

        evicted
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Exchange, Error> {
        let entry = self.entry(key).ok_or_else(|| Error::CacheMiss(key.to_string()))?;

        if entry.is_expired() {
            self.remove_if_current(key, &entry);
            return Err(Error::Expired(key.to_string()));
        }

        entry.access();
        entry.load(key)
    }

    fn set(&self, key: &str, exchange: &Exchange, ttl: TimeDelta) -> Result<(), Error> {
        let request = exchange
            .request()
            .ok_or_else(|| Error::InvalidInput("response has no originating request".into()))?;

        if !self.policy.is_cacheable(&exchange.response, request) {
            return Ok(());
        }

        let expiration = Utc::now().checked_add_signed(ttl);
        let entry = Entry::new(key, exchange, expiration)?;
        self.insert_entry(entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), Error> {
        self.state.write().remove(key).map(|_| ()).ok_or_else(|| Error::CacheMiss(key.to_string()))
    }

    fn policy(&self) -> &Policy {
        &self.policy
    }

    fn purge(&self) -> Result<(), Error> {
        let mut state = self.state.write();
        state.entries.clear();
        state.current_size = 0;
        Ok(())
    }
}
