//! Configuration validation rules.

use http::header::HeaderName;
use http::{Method, StatusCode};
use thiserror::Error;

use crate::config::CacheConfig;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl CacheConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - a status code is outside 100..=999
    /// - a method or excluded header is not a valid token
    /// - `pattern_cache_capacity` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(code) = self.allowed_status_codes.iter().find(|&&code| StatusCode::from_u16(code).is_err()) {
            return Err(ConfigError::Invalid {
                field: "allowed_status_codes".into(),
                reason: format!("{code} is outside 100..=999"),
            });
        }

        if let Some(method) = self.allowed_methods.iter().find(|m| Method::from_bytes(m.trim().as_bytes()).is_err()) {
            return Err(ConfigError::Invalid {
                field: "allowed_methods".into(),
                reason: format!("{method:?} is not a valid method"),
            });
        }

        if let Some(header) =
            self.excluded_headers.iter().find(|h| HeaderName::from_bytes(h.trim().as_bytes()).is_err())
        {
            return Err(ConfigError::Invalid {
                field: "excluded_headers".into(),
                reason: format!("{header:?} is not a valid header name"),
            });
        }

        if self.pattern_cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "pattern_cache_capacity".into(),
                reason: "must be greater than 0".into(),
            });
        }

        for (index, rule) in self.rules.iter().enumerate() {
            if rule.is_empty() {
                tracing::warn!(index, "Rule has neither url nor pattern and will never match");
            }
        }

        Ok(())
    }
}
