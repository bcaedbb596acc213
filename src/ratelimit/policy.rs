//! Window policies: "at most `limit` attempts per rolling `window`".

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TurnstileError};

/// Default number of admissions per window when no policy is supplied.
pub const DEFAULT_LIMIT: u64 = 20;
/// Default window length when no policy is supplied.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// A validated admission rule. Both fields are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowPolicy {
    limit: u64,
    window: Duration,
}

impl WindowPolicy {
    /// Strict constructor, rejects a zero limit or an empty window.
    pub fn new(limit: u64, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(TurnstileError::InvalidPolicy(
                "limit must be greater than 0".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(TurnstileError::InvalidPolicy(
                "window must be greater than 0".to_string(),
            ));
        }
        Ok(Self { limit, window })
    }

    /// Strict constructor taking the window in milliseconds.
    pub fn from_millis(limit: u64, window_ms: u64) -> Result<Self> {
        Self::new(limit, Duration::from_millis(window_ms))
    }

    /// Build a policy from loosely-typed values.
    ///
    /// Each field that is missing, non-finite, or not positive falls back to
    /// the built-in default independently. Fractional limits are truncated.
    pub fn coerce(limit: Option<f64>, window_ms: Option<f64>) -> Self {
        PolicySpec { limit, window_ms }.resolve(&Self::default())
    }

    /// Maximum admissions per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Length of the rolling window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Window length in whole milliseconds.
    pub fn window_ms(&self) -> u64 {
        millis(self.window)
    }
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Unvalidated policy values as they arrive from configuration or callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySpec {
    /// Requested limit
    #[serde(default)]
    pub limit: Option<f64>,
    /// Requested window in milliseconds
    #[serde(default)]
    pub window_ms: Option<f64>,
}

impl PolicySpec {
    /// Resolve into a usable policy, taking each bad field from `fallback`.
    pub fn resolve(&self, fallback: &WindowPolicy) -> WindowPolicy {
        let limit = match self.limit {
            None => fallback.limit,
            Some(raw) => coerce_limit(raw).unwrap_or_else(|| {
                warn!(limit = raw, fallback = fallback.limit, "Ignoring invalid policy limit");
                fallback.limit
            }),
        };

        let window = match self.window_ms {
            None => fallback.window,
            Some(raw) => coerce_window(raw).unwrap_or_else(|| {
                warn!(
                    window_ms = raw,
                    fallback_ms = fallback.window_ms(),
                    "Ignoring invalid policy window"
                );
                fallback.window
            }),
        };

        WindowPolicy { limit, window }
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn coerce_limit(raw: f64) -> Option<u64> {
    if !raw.is_finite() || raw < 1.0 {
        return None;
    }
    // Saturating float-to-int cast.
    Some(raw.trunc() as u64)
}

fn coerce_window(raw_ms: f64) -> Option<Duration> {
    if !raw_ms.is_finite() || raw_ms <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(raw_ms / 1000.0)
        .ok()
        .filter(|window| !window.is_zero())
}
