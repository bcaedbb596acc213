//! Rate-limit key construction.

use std::fmt;

/// A structured rate-limit key.
///
/// The limiter only compares keys as strings; this type gives callers a
/// consistent way to build them from a scope and ordered key/value parts,
/// rendered as `scope:k1=v1,k2=v2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    scope: String,
    entries: Vec<(String, String)>,
    rendered: String,
}

impl RateLimitKey {
    /// Start a key for `scope` (e.g. `login`, `api:search`).
    pub fn new(scope: impl Into<String>) -> Self {
        let scope = scope.into();
        Self {
            rendered: format!("{}:", scope),
            scope,
            entries: Vec::new(),
        }
    }

    /// Add a key/value part. Order is significant.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();

        if !self.entries.is_empty() {
            self.rendered.push(',');
        }
        self.rendered.push_str(&key);
        self.rendered.push('=');
        self.rendered.push_str(&value);

        self.entries.push((key, value));
        self
    }

    /// The key's scope.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The key/value parts, in insertion order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// The rendered string the limiter stores hits under.
    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl AsRef<str> for RateLimitKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl From<RateLimitKey> for String {
    fn from(key: RateLimitKey) -> Self {
        key.rendered
    }
}
