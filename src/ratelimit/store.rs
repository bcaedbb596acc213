//! Per-key hit history storage.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info};

use super::window::{window_start, WindowCount};
use crate::error::{Result, TurnstileError};

/// Storage for per-key hit histories.
///
/// Implementations must make [`record_hit`](KeyStore::record_hit) atomic with
/// respect to every other mutation of the same key, and must not serialize
/// unrelated keys behind a single lock.
pub trait KeyStore: Send + Sync {
    /// Drop hits older than the window ending at `now`, append `now`, and
    /// count what is left inside the window. Creates the log on first hit.
    ///
    /// The store remembers the longest `window` each key has been checked
    /// under so that [`evict_idle`](KeyStore::evict_idle) never forgets hits
    /// that still count.
    fn record_hit(&self, key: &str, now: Instant, window: Duration) -> WindowCount;

    /// Remove hits strictly older than `cutoff`. Unknown keys are ignored.
    fn prune(&self, key: &str, cutoff: Instant);

    /// Clear one key, or every key when `key` is `None`.
    fn reset(&self, key: Option<&str>);

    /// Remove keys that are empty, or whose newest hit is strictly older than
    /// `now - max(horizon, longest window seen for the key)`.
    ///
    /// Returns the number of keys removed.
    fn evict_idle(&self, now: Instant, horizon: Duration) -> usize;

    /// Snapshot of a key's log, if the key exists.
    fn hits(&self, key: &str) -> Option<Vec<Instant>>;

    /// Number of tracked keys.
    fn key_count(&self) -> usize;
}

/// Ordered hit timestamps for one key, oldest first.
#[derive(Debug, Default)]
struct HitLog {
    hits: VecDeque<Instant>,
    /// Longest window this key has been evaluated under
    retention: Duration,
}

impl HitLog {
    /// Drop entries strictly older than `cutoff` from the front of the log.
    fn prune(&mut self, cutoff: Instant) {
        while self.hits.front().is_some_and(|oldest| *oldest < cutoff) {
            self.hits.pop_front();
        }
    }

    /// Append `now`, keeping the log sorted if a caller read its clock late.
    fn insert(&mut self, now: Instant) {
        match self.hits.back() {
            Some(newest) if *newest > now => {
                let pos = self.hits.partition_point(|ts| *ts <= now);
                self.hits.insert(pos, now);
            }
            _ => self.hits.push_back(now),
        }
    }

    /// Hits strictly newer than `start`.
    fn count_after(&self, start: Option<Instant>) -> WindowCount {
        let first = match start {
            Some(start) => self.hits.partition_point(|ts| *ts <= start),
            None => 0,
        };
        WindowCount {
            count: (self.hits.len() - first) as u64,
            oldest: self.hits.get(first).copied(),
        }
    }

    fn is_idle(&self, now: Instant, horizon: Duration) -> bool {
        let Some(newest) = self.hits.back() else {
            return true;
        };
        now.checked_sub(horizon.max(self.retention))
            .is_some_and(|idle_before| *newest < idle_before)
    }
}

/// In-memory store sharded by key hash.
///
/// Each key's log lives in one `DashMap` shard, so a check holds only that
/// shard's write lock while it prunes, appends and counts.
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    logs: DashMap<String, HitLog>,
}

impl InMemoryKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with a fixed shard count.
    ///
    /// The count must be a power of two greater than one.
    pub fn with_shard_amount(shards: usize) -> Result<Self> {
        if shards < 2 || !shards.is_power_of_two() {
            return Err(TurnstileError::Config(format!(
                "shard amount must be a power of two greater than 1, got {}",
                shards
            )));
        }
        Ok(Self {
            logs: DashMap::with_shard_amount(shards),
        })
    }
}

impl KeyStore for InMemoryKeyStore {
    fn record_hit(&self, key: &str, now: Instant, window: Duration) -> WindowCount {
        let mut log = match self.logs.get_mut(key) {
            Some(log) => log,
            None => {
                debug!(key = %key, "Creating hit log");
                self.logs.entry(key.to_owned()).or_default()
            }
        };

        let start = window_start(now, window);
        if let Some(start) = start {
            log.prune(start);
        }
        log.insert(now);
        log.retention = log.retention.max(window);

        log.count_after(start)
    }

    fn prune(&self, key: &str, cutoff: Instant) {
        if let Some(mut log) = self.logs.get_mut(key) {
            log.prune(cutoff);
        }
    }

    fn reset(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                let removed = self.logs.remove(key).is_some();
                info!(key = %key, removed = removed, "Reset rate limit key");
            }
            None => {
                let keys = self.logs.len();
                self.logs.clear();
                info!(keys = keys, "Reset all rate limit keys");
            }
        }
    }

    fn evict_idle(&self, now: Instant, horizon: Duration) -> usize {
        let mut evicted = 0;
        self.logs.retain(|_, log| {
            let idle = log.is_idle(now, horizon);
            if idle {
                evicted += 1;
            }
            !idle
        });
        evicted
    }

    fn hits(&self, key: &str) -> Option<Vec<Instant>> {
        self.logs
            .get(key)
            .map(|log| log.hits.iter().copied().collect())
    }

    fn key_count(&self) -> usize {
        self.logs.len()
    }
}
