//! Cache configuration with layered loading.
//!
//! Configuration is loaded with figment from, highest precedence first:
//!
//! 1. Environment variables (PAGECACHE_*)
//! 2. TOML config file (if PAGECACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::sync::Arc;

use chrono::TimeDelta;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use http::header::HeaderName;
use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use crate::cache::{DEFAULT_CACHE_NAME, DEFAULT_CAPACITY};
use crate::policy::{
    DEFAULT_MAX_BODY_SIZE, DEFAULT_PATTERN_CACHE_CAPACITY, DEFAULT_STATUS_CODES, DEFAULT_TTL, LruPatternCache, Policy,
    Rule,
};

mod validation;

pub use validation::ConfigError;

/// Settings for a cache and the policy it admits responses with.
///
/// Every field has a default matching [`Policy::default`], so an empty
/// environment yields the stock cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Namespace mixed into every cache key.
    ///
    /// Set via PAGECACHE_CACHE_NAME.
    pub cache_name: String,

    /// Storage budget in entry-size units. Zero means the default.
    ///
    /// Set via PAGECACHE_CAPACITY.
    pub capacity: u64,

    /// TTL in seconds when no `max-age` applies. Negative disables caching.
    ///
    /// Set via PAGECACHE_DEFAULT_TTL_SECS.
    pub default_ttl_secs: i64,

    /// Largest declared body, in bytes, that may be cached. Zero or less is
    /// unlimited.
    pub max_body_size: i64,

    /// Honour `Cache-Control` directives on responses.
    pub use_cache_control: bool,

    pub allowed_status_codes: Vec<u16>,
    pub allowed_methods: Vec<String>,
    pub excluded_headers: Vec<String>,
    pub excluded_cookies: Vec<String>,

    /// Include/exclude rules, first match wins.
    pub rules: Vec<Rule>,

    /// Number of compiled rule patterns kept in memory.
    pub pattern_cache_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.into(),
            capacity: DEFAULT_CAPACITY,
            default_ttl_secs: DEFAULT_TTL.num_seconds(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            use_cache_control: true,
            allowed_status_codes: DEFAULT_STATUS_CODES.iter().map(StatusCode::as_u16).collect(),
            allowed_methods: vec!["GET".into(), "HEAD".into()],
            excluded_headers: vec!["authorization".into()],
            excluded_cookies: vec!["sessionid".into()],
            rules: Vec::new(),
            pattern_cache_capacity: DEFAULT_PATTERN_CACHE_CAPACITY,
        }
    }
}

impl CacheConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config file or environment cannot be
    /// parsed, or if validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("PAGECACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        Self::from_figment(figment)
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let figment = figment.merge(
            Env::prefixed("PAGECACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// The key namespace, falling back to the default for a blank name.
    pub fn cache_name(&self) -> &str {
        let name = self.cache_name.trim();
        if name.is_empty() { DEFAULT_CACHE_NAME } else { name }
    }

    pub fn default_ttl(&self) -> TimeDelta {
        TimeDelta::try_seconds(self.default_ttl_secs).unwrap_or(DEFAULT_TTL)
    }

    /// Build the policy these settings describe.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for status codes, methods, or header
    /// names that do not parse.
    pub fn policy(&self) -> Result<Policy, ConfigError> {
        let status_codes = self
            .allowed_status_codes
            .iter()
            .map(|&code| parse_status(code))
            .collect::<Result<Vec<_>, _>>()?;
        let methods = self.allowed_methods.iter().map(|m| parse_method(m)).collect::<Result<Vec<_>, _>>()?;
        let headers = self.excluded_headers.iter().map(|h| parse_header(h)).collect::<Result<Vec<_>, _>>()?;

        let mut policy = Policy::empty()
            .with_status_codes(status_codes)
            .with_methods(methods)
            .with_excluded_headers(headers)
            .with_excluded_cookies(self.excluded_cookies.iter().cloned())
            .with_max_body_size(self.max_body_size)
            .with_cache_control(self.use_cache_control)
            .with_default_ttl(self.default_ttl())
            .with_pattern_compiler(Arc::new(LruPatternCache::new(self.pattern_cache_capacity)));

        for rule in &self.rules {
            policy = policy.with_rule(rule.clone());
        }

        Ok(policy)
    }
}

fn parse_status(code: u16) -> Result<StatusCode, ConfigError> {
    StatusCode::from_u16(code).map_err(|_| ConfigError::Invalid {
        field: "allowed_status_codes".into(),
        reason: format!("{code} is not a valid status code"),
    })
}

fn parse_method(method: &str) -> Result<Method, ConfigError> {
    Method::from_bytes(method.trim().to_uppercase().as_bytes()).map_err(|_| ConfigError::Invalid {
        field: "allowed_methods".into(),
        reason: format!("{method:?} is not a valid method"),
    })
}

fn parse_header(header: &str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_bytes(header.trim().as_bytes()).map_err(|_| ConfigError::Invalid {
        field: "excluded_headers".into(),
        reason: format!("{header:?} is not a valid header name"),
    })
}
