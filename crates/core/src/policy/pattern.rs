//! Compiled-pattern caches for URL rules.
//!
//! Compiling a regular expression is far more expensive than matching one,
//! and rule evaluation runs once per response. Policies therefore hold an
//! injectable [`PatternCompiler`] that hands out shared, already-compiled
//! expressions keyed by pattern text and flags.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use regex::{Regex, RegexBuilder};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Default number of compiled patterns kept by [`LruPatternCache`].
pub const DEFAULT_PATTERN_CACHE_CAPACITY: usize = 128;

/// Compilation flags for a rule pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternFlags {
    pub case_insensitive: bool,
    pub multi_line: bool,
    pub dot_matches_new_line: bool,
    pub ignore_whitespace: bool,
}

impl PatternFlags {
    pub fn case_insensitive() -> Self {
        Self { case_insensitive: true, ..Self::default() }
    }
}

/// Source of compiled regular expressions.
pub trait PatternCompiler: fmt::Debug + Send + Sync {
    /// Compile `pattern` with `flags`, possibly returning a cached result.
    fn compile(&self, pattern: &str, flags: PatternFlags) -> Result<Arc<Regex>, regex::Error>;
}

fn build(pattern: &str, flags: PatternFlags) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.case_insensitive)
        .multi_line(flags.multi_line)
        .dot_matches_new_line(flags.dot_matches_new_line)
        .ignore_whitespace(flags.ignore_whitespace)
        .build()
}

type PatternKey = (String, PatternFlags);

/// Bounded pattern cache with least-recently-used replacement.
pub struct LruPatternCache {
    entries: Mutex<LruCache<PatternKey, Arc<Regex>>>,
}

impl LruPatternCache {
    /// Create a cache holding at most `capacity` compiled patterns. A zero
    /// capacity falls back to [`DEFAULT_PATTERN_CACHE_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_PATTERN_CACHE_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self { entries: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for LruPatternCache {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_CACHE_CAPACITY)
    }
}

impl fmt::Debug for LruPatternCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("LruPatternCache")
            .field("len", &entries.len())
            .field("capacity", &entries.cap())
            .finish()
    }
}

impl PatternCompiler for LruPatternCache {
    fn compile(&self, pattern: &str, flags: PatternFlags) -> Result<Arc<Regex>, regex::Error> {
        let key = (pattern.to_string(), flags);
        if let Some(regex) = self.entries.lock().get(&key) {
            return Ok(Arc::clone(regex));
        }

        // Compiled without holding the lock; a racing compile of the same
        // pattern just overwrites an equivalent value.
        let regex = Arc::new(build(pattern, flags)?);
        self.entries.lock().put(key, Arc::clone(&regex));
        Ok(regex)
    }
}

/// Pattern cache that never forgets a compiled pattern.
#[derive(Default)]
pub struct UnboundedPatternCache {
    entries: RwLock<FxHashMap<PatternKey, Arc<Regex>>>,
}

impl UnboundedPatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for UnboundedPatternCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnboundedPatternCache").field("len", &self.len()).finish()
    }
}

impl PatternCompiler for UnboundedPatternCache {
    fn compile(&self, pattern: &str, flags: PatternFlags) -> Result<Arc<Regex>, regex::Error> {
        let key = (pattern.to_string(), flags);
        if let Some(regex) = self.entries.read().get(&key) {
            return Ok(Arc::clone(regex));
        }

        let regex = Arc::new(build(pattern, flags)?);
        Ok(Arc::clone(self.entries.write().entry(key).or_insert(regex)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_reuses_compiled_pattern() {
        let cache = LruPatternCache::new(4);
        let first = cache.compile(r"^https://example\.com/.*", PatternFlags::default()).unwrap();
        let second = cache.compile(r"^https://example\.com/.*", PatternFlags::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_flags_are_part_of_key() {
        let cache = LruPatternCache::new(4);
        let plain = cache.compile("example", PatternFlags::default()).unwrap();
        let folded = cache.compile("example", PatternFlags::case_insensitive()).unwrap();
        assert!(!Arc::ptr_eq(&plain, &folded));
        assert!(!plain.is_match("EXAMPLE"));
        assert!(folded.is_match("EXAMPLE"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lru_is_bounded() {
        let cache = LruPatternCache::new(2);
        for pattern in ["a", "b", "c"] {
            cache.compile(pattern, PatternFlags::default()).unwrap();
        }
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lru_zero_capacity_uses_default() {
        let cache = LruPatternCache::new(0);
        assert!(cache.is_empty());
        assert!(format!("{cache:?}").contains("capacity: 128"));
    }

    #[test]
    fn test_invalid_pattern_is_not_cached() {
        let cache = LruPatternCache::default();
        assert!(cache.compile("(unclosed", PatternFlags::default()).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unbounded_reuses_compiled_pattern() {
        let cache = UnboundedPatternCache::new();
        let first = cache.compile("/api/", PatternFlags::default()).unwrap();
        let second = cache.compile("/api/", PatternFlags::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert!(cache.compile("[", PatternFlags::default()).is_err());
        assert_eq!(cache.len(), 1);
    }
}
