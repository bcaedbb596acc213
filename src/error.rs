//! Error types for Turnstile.

use std::time::Duration;

use thiserror::Error;

use crate::ratelimit::Decision;

/// Status hint attached to a denied admission (HTTP "Too Many Requests").
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Error type for the configuration and I/O layers around the limiter.
///
/// The admission path itself never produces this type; see [`RateLimitExceeded`].
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A policy rejected by strict construction
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// YAML parse errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Layered configuration source errors
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;

/// Raised by [`RateLimiter::require`](crate::ratelimit::RateLimiter::require)
/// when the attempt is not admitted.
///
/// Carries the decision that caused the rejection so callers can still emit
/// `X-RateLimit-*` style metadata.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Rate limit exceeded: retry after {}ms", .decision.reset_ms())]
pub struct RateLimitExceeded {
    decision: Decision,
}

impl RateLimitExceeded {
    pub(crate) fn new(decision: Decision) -> Self {
        Self { decision }
    }

    /// How long until the oldest counted hit leaves the window.
    pub fn retry_after(&self) -> Duration {
        self.decision.reset_after
    }

    /// [`retry_after`](Self::retry_after) in whole milliseconds, rounded up.
    pub fn retry_after_ms(&self) -> u64 {
        self.decision.reset_ms()
    }

    /// Transport status hint, always 429.
    pub fn status(&self) -> u16 {
        TOO_MANY_REQUESTS
    }

    /// The denied decision.
    pub fn decision(&self) -> &Decision {
        &self.decision
    }
}
