//! URL rules: exact-match or pattern predicates with an include/exclude outcome.

use serde::{Deserialize, Serialize};

use super::pattern::{PatternCompiler, PatternFlags};

/// What to do with a response whose request URL matched a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    /// Stop evaluating rules; the remaining policy checks still apply.
    #[default]
    Include,

    /// Reject the response.
    Exclude,
}

/// A URL predicate.
///
/// `url` is an exact match and takes precedence over `pattern`. A rule with
/// both empty never matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    pub url: String,
    pub pattern: String,
    pub flags: PatternFlags,
    pub behavior: Behavior,
}

impl Rule {
    /// Rule matching exactly one URL.
    pub fn url(url: impl Into<String>, behavior: Behavior) -> Self {
        Self { url: url.into(), behavior, ..Self::default() }
    }

    /// Rule matching URLs against a regular expression.
    pub fn pattern(pattern: impl Into<String>, flags: PatternFlags, behavior: Behavior) -> Self {
        Self { pattern: pattern.into(), flags, behavior, ..Self::default() }
    }

    /// Whether neither `url` nor `pattern` is set.
    pub fn is_empty(&self) -> bool {
        self.url.is_empty() && self.pattern.is_empty()
    }

    /// Test `url` against this rule.
    ///
    /// Pattern compilation errors are logged and count as a non-match.
    pub fn matches(&self, url: &str, patterns: &dyn PatternCompiler) -> bool {
        if !self.url.is_empty() {
            return self.url == url;
        }

        if self.pattern.is_empty() {
            return false;
        }

        match patterns.compile(&self.pattern, self.flags) {
            Ok(regex) => regex.is_match(url),
            Err(err) => {
                tracing::warn!(pattern = %self.pattern, error = %err, "rule pattern failed to compile");
                false
            }
        }
    }
}
