//! Cacheability policy.
//!
//! A [`Policy`] decides whether a response may be stored and for how long.
//! Evaluation is total and side-effect free apart from logging: unparsable
//! headers and uncompilable rule patterns fail open instead of erroring.

pub mod headers;
pub mod pattern;
pub mod rule;

use std::fmt;
use std::sync::Arc;

use chrono::TimeDelta;
use http::header::HeaderName;
use http::{Method, Request, Response, StatusCode};
use rustc_hash::FxHashSet;

pub use headers::{is_body_size_within_limit, max_age};
pub use pattern::{
    DEFAULT_PATTERN_CACHE_CAPACITY, LruPatternCache, PatternCompiler, PatternFlags, UnboundedPatternCache,
};
pub use rule::{Behavior, Rule};

/// Default time-to-live for cached responses (60 minutes).
pub const DEFAULT_TTL: TimeDelta = TimeDelta::minutes(60);

/// Default maximum response body size (5 MiB).
pub const DEFAULT_MAX_BODY_SIZE: i64 = 5 * 1024 * 1024;

/// Status codes cached by [`Policy::default`].
pub const DEFAULT_STATUS_CODES: [StatusCode; 11] = [
    StatusCode::OK,
    StatusCode::NON_AUTHORITATIVE_INFORMATION,
    StatusCode::NO_CONTENT,
    StatusCode::PARTIAL_CONTENT,
    StatusCode::MULTIPLE_CHOICES,
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::METHOD_NOT_ALLOWED,
    StatusCode::GONE,
    StatusCode::URI_TOO_LONG,
    StatusCode::NOT_IMPLEMENTED,
];

/// Conditions under which an HTTP response may be cached.
#[derive(Clone)]
pub struct Policy {
    pub allowed_status_codes: FxHashSet<StatusCode>,
    pub allowed_methods: FxHashSet<Method>,
    pub excluded_headers: FxHashSet<HeaderName>,
    pub excluded_cookies: FxHashSet<String>,

    /// Evaluated in order; the first matching rule decides.
    pub rules: Vec<Rule>,

    /// Maximum declared body size in bytes. Zero or less means unlimited.
    pub max_body_size: i64,

    /// Whether `Cache-Control` may reject a response and override the TTL.
    pub use_cache_control: bool,

    /// TTL used when no `max-age` applies. Negative values make every
    /// response uncacheable; zero is a valid, immediately-expiring TTL.
    pub default_ttl: TimeDelta,

    patterns: Arc<dyn PatternCompiler>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            allowed_status_codes: DEFAULT_STATUS_CODES.into_iter().collect(),
            allowed_methods: [Method::GET, Method::HEAD].into_iter().collect(),
            excluded_headers: [http::header::AUTHORIZATION].into_iter().collect(),
            excluded_cookies: ["sessionid".to_string()].into_iter().collect(),
            rules: Vec::new(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            use_cache_control: true,
            default_ttl: DEFAULT_TTL,
            patterns: Arc::new(LruPatternCache::default()),
        }
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("allowed_status_codes", &self.allowed_status_codes)
            .field("allowed_methods", &self.allowed_methods)
            .field("excluded_headers", &self.excluded_headers)
            .field("excluded_cookies", &self.excluded_cookies)
            .field("rules", &self.rules)
            .field("max_body_size", &self.max_body_size)
            .field("use_cache_control", &self.use_cache_control)
            .field("default_ttl", &self.default_ttl)
            .field("patterns", &self.patterns)
            .finish()
    }
}

impl Policy {
    /// A policy that allows nothing; useful as a base for builder calls.
    pub fn empty() -> Self {
        Self {
            allowed_status_codes: FxHashSet::default(),
            allowed_methods: FxHashSet::default(),
            excluded_headers: FxHashSet::default(),
            excluded_cookies: FxHashSet::default(),
            rules: Vec::new(),
            max_body_size: 0,
            use_cache_control: false,
            default_ttl: DEFAULT_TTL,
            patterns: Arc::new(LruPatternCache::default()),
        }
    }

    pub fn with_status_codes(mut self, codes: impl IntoIterator<Item = StatusCode>) -> Self {
        self.allowed_status_codes = codes.into_iter().collect();
        self
    }

    pub fn with_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.allowed_methods = methods.into_iter().collect();
        self
    }

    pub fn with_excluded_headers(mut self, headers: impl IntoIterator<Item = HeaderName>) -> Self {
        self.excluded_headers = headers.into_iter().collect();
        self
    }

    pub fn with_excluded_cookies<S: Into<String>>(mut self, cookies: impl IntoIterator<Item = S>) -> Self {
        self.excluded_cookies = cookies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: i64) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn with_cache_control(mut self, use_cache_control: bool) -> Self {
        self.use_cache_control = use_cache_control;
        self
    }

    pub fn with_default_ttl(mut self, ttl: TimeDelta) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Replace the compiled-pattern cache used by pattern rules.
    pub fn with_pattern_compiler(mut self, patterns: Arc<dyn PatternCompiler>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn pattern_compiler(&self) -> &Arc<dyn PatternCompiler> {
        &self.patterns
    }

    pub fn is_status_code_allowed(&self, status: StatusCode) -> bool {
        self.allowed_status_codes.contains(&status)
    }

    pub fn is_method_allowed(&self, method: &Method) -> bool {
        self.allowed_methods.contains(method)
    }

    pub fn is_header_excluded(&self, header: &HeaderName) -> bool {
        self.excluded_headers.contains(header)
    }

    pub fn is_cookie_excluded(&self, cookie: &str) -> bool {
        self.excluded_cookies.contains(cookie)
    }

    /// Decide whether `response`, produced by `request`, may be cached.
    ///
    /// Checks run in a fixed order and stop at the first failure: status,
    /// method, excluded headers, excluded cookies, body size, URL rules,
    /// `Cache-Control: no-store|private`, and finally a negative TTL.
    pub fn is_cacheable<A, B>(&self, response: &Response<A>, request: &Request<B>) -> bool {
        match self.rejection(response, request) {
            Some(reason) => {
                tracing::debug!(
                    status = response.status().as_u16(),
                    method = %request.method(),
                    url = %request.uri(),
                    reason,
                    "response not cacheable"
                );
                false
            }
            None => true,
        }
    }

    fn rejection<A, B>(&self, response: &Response<A>, request: &Request<B>) -> Option<&'static str> {
        if !self.is_status_code_allowed(response.status()) {
            return Some("status code not allowed");
        }

        if !self.is_method_allowed(request.method()) {
            return Some("method not allowed");
        }

        let resp_headers = response.headers();
        if resp_headers.keys().any(|name| self.is_header_excluded(name)) {
            return Some("excluded header present");
        }

        if headers::set_cookie_names(resp_headers).any(|name| self.is_cookie_excluded(&name)) {
            return Some("excluded cookie set");
        }

        if !is_body_size_within_limit(resp_headers, self.max_body_size) {
            return Some("body exceeds max size");
        }

        let url = request.uri().to_string();
        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(&url, self.patterns.as_ref()))
            && rule.behavior == Behavior::Exclude
        {
            return Some("excluded by rule");
        }

        if self.use_cache_control && headers::cache_control_is(resp_headers, &["no-store", "private"]) {
            return Some("cache-control forbids storing");
        }

        if self.ttl(response) < TimeDelta::zero() {
            return Some("negative ttl");
        }

        None
    }

    /// Time-to-live for `response`.
    ///
    /// With `use_cache_control`, the first parseable `max-age` directive
    /// wins; otherwise, or when none parses, the default TTL applies.
    pub fn ttl<A>(&self, response: &Response<A>) -> TimeDelta {
        if self.use_cache_control
            && let Some(secs) = max_age(response.headers())
            && let Some(ttl) = TimeDelta::try_seconds(secs)
        {
            return ttl;
        }

        self.default_ttl
    }
}
