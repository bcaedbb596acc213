//! Background eviction of idle keys.
//!
//! Keys are never removed by normal traffic, so a process that sees many
//! short-lived keys (per-IP limits under churn) grows without bound unless
//! something sweeps them.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::clock::Clock;
use super::limiter::RateLimiter;
use super::policy::millis;
use super::store::KeyStore;
use crate::error::{Result, TurnstileError};

/// How often to sweep and how long a key may sit idle before removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Time between sweeps
    pub interval: Duration,
    /// Keys with no hit newer than this (or than their longest window,
    /// whichever is longer) are evicted
    pub idle_horizon: Duration,
}

impl SweeperConfig {
    /// Create a sweeper config.
    ///
    /// # Errors
    /// Returns `TurnstileError::Config` if `interval` is zero.
    pub fn new(interval: Duration, idle_horizon: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(TurnstileError::Config(
                "sweep interval must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            interval,
            idle_horizon,
        })
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            idle_horizon: Duration::from_secs(300),
        }
    }
}

/// Periodic idle-key eviction task.
pub struct Sweeper;

impl Sweeper {
    /// Spawn the sweep loop on the current tokio runtime.
    ///
    /// The task runs until the returned handle is aborted.
    pub fn spawn<S, C>(limiter: Arc<RateLimiter<S, C>>, config: SweeperConfig) -> JoinHandle<()>
    where
        S: KeyStore + 'static,
        C: Clock + 'static,
    {
        info!(
            interval_ms = millis(config.interval),
            idle_horizon_ms = millis(config.idle_horizon),
            "Starting idle key sweeper"
        );

        tokio::spawn(async move {
            let mut ticker = interval(config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let evicted = limiter.evict_idle(config.idle_horizon);
                debug!(
                    evicted = evicted,
                    keys = limiter.key_count(),
                    "Idle key sweep finished"
                );
            }
        })
    }
}
