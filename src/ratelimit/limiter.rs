//! Admission facade.

use parking_lot::RwLock;
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::policy::{PolicySpec, WindowPolicy};
use super::rules::PolicyRules;
use super::store::{InMemoryKeyStore, KeyStore};
use super::window::{decide, Decision};
use crate::config::LimiterConfig;
use crate::error::{RateLimitExceeded, Result};

/// Key-scoped sliding-window rate limiter.
///
/// One instance is meant to be built at startup and shared (usually behind an
/// `Arc`) by every caller. All methods take `&self`.
///
/// Policy resolution for a call is: the explicit policy argument, else the
/// longest matching [`PolicyRules`] prefix, else the limiter's default policy.
pub struct RateLimiter<S = InMemoryKeyStore, C = SystemClock> {
    store: S,
    clock: C,
    default_policy: WindowPolicy,
    rules: RwLock<PolicyRules>,
}

impl RateLimiter {
    /// Create a limiter with an in-memory store, the system clock, and the
    /// built-in default policy (20 per 60s).
    pub fn new() -> Self {
        Self::with_parts(InMemoryKeyStore::new(), SystemClock::new())
    }

    /// Create a limiter from configuration, loading the rules file if one
    /// is configured.
    pub fn from_config(config: &LimiterConfig) -> Result<Self> {
        let rules = match &config.rules_path {
            Some(path) => PolicyRules::from_file(path)?,
            None => PolicyRules::new(),
        };

        Ok(Self::new()
            .with_default_policy(config.default_policy())
            .with_rules(rules))
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RateLimiter<InMemoryKeyStore, C> {
    /// Create a limiter with an in-memory store and a custom clock.
    pub fn with_clock(clock: C) -> Self {
        Self::with_parts(InMemoryKeyStore::new(), clock)
    }
}

impl<S: KeyStore, C: Clock> RateLimiter<S, C> {
    /// Create a limiter from an explicit store and clock.
    pub fn with_parts(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            default_policy: WindowPolicy::default(),
            rules: RwLock::new(PolicyRules::new()),
        }
    }

    /// Replace the policy used when neither the caller nor a rule supplies one.
    pub fn with_default_policy(mut self, policy: WindowPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Install prefix rules.
    pub fn with_rules(mut self, rules: PolicyRules) -> Self {
        self.rules = RwLock::new(rules);
        self
    }

    /// Swap the prefix rules at runtime.
    pub fn set_rules(&self, rules: PolicyRules) {
        *self.rules.write() = rules;
    }

    /// The fallback policy.
    pub fn default_policy(&self) -> WindowPolicy {
        self.default_policy
    }

    /// The policy a call for `key` would be evaluated under.
    pub fn resolve_policy(&self, key: &str, policy: Option<WindowPolicy>) -> WindowPolicy {
        if let Some(policy) = policy {
            return policy;
        }

        let rules = self.rules.read();
        match rules.find(key) {
            Some(rule) => rule.policy(&self.default_policy),
            None => self.default_policy,
        }
    }

    /// Record an attempt for `key` and decide whether it is admitted.
    ///
    /// The hit is recorded whether or not it is admitted.
    pub fn check(&self, key: impl AsRef<str>, policy: Option<WindowPolicy>) -> Decision {
        let key = key.as_ref();
        let policy = self.resolve_policy(key, policy);

        let now = self.clock.now();
        let live = self.store.record_hit(key, now, policy.window());
        let decision = decide(live, now, &policy);

        trace!(
            key = %key,
            count = decision.count,
            limit = decision.limit,
            remaining = decision.remaining,
            "Checked rate limit"
        );

        if !decision.allowed {
            debug!(
                key = %key,
                count = decision.count,
                limit = decision.limit,
                reset_ms = decision.reset_ms(),
                "Admission denied"
            );
        }

        decision
    }

    /// Like [`check`](Self::check), but a denial is returned as an error.
    pub fn require(
        &self,
        key: impl AsRef<str>,
        policy: Option<WindowPolicy>,
    ) -> std::result::Result<Decision, RateLimitExceeded> {
        let decision = self.check(key, policy);
        if decision.allowed {
            Ok(decision)
        } else {
            Err(RateLimitExceeded::new(decision))
        }
    }

    /// Like [`check`](Self::check), with the policy given as loosely-typed
    /// values.
    ///
    /// Missing or invalid fields are taken from the policy the key would get
    /// without an explicit one (its matching rule, else the default policy).
    pub fn check_spec(&self, key: impl AsRef<str>, spec: &PolicySpec) -> Decision {
        let key = key.as_ref();
        let policy = spec.resolve(&self.resolve_policy(key, None));
        self.check(key, Some(policy))
    }

    /// [`require`](Self::require) with a loosely-typed policy, resolved as in
    /// [`check_spec`](Self::check_spec).
    pub fn require_spec(
        &self,
        key: impl AsRef<str>,
        spec: &PolicySpec,
    ) -> std::result::Result<Decision, RateLimitExceeded> {
        let key = key.as_ref();
        let policy = spec.resolve(&self.resolve_policy(key, None));
        self.require(key, Some(policy))
    }

    /// Clear one key's history, or every key when `key` is `None`.
    ///
    /// Administrative only; the admission path never calls this.
    pub fn reset(&self, key: Option<&str>) {
        self.store.reset(key);
    }

    /// Forget keys that have not been hit within `horizon`.
    ///
    /// A key checked under a window longer than `horizon` is kept until that
    /// window has passed, so eviction never drops hits that still count.
    pub fn evict_idle(&self, horizon: Duration) -> usize {
        let evicted = self.store.evict_idle(self.clock.now(), horizon);
        if evicted > 0 {
            debug!(evicted = evicted, remaining_keys = self.store.key_count(), "Evicted idle keys");
        }
        evicted
    }

    /// Number of keys currently tracked.
    pub fn key_count(&self) -> usize {
        self.store.key_count()
    }

    /// Number of hits stored for `key`, including expired ones not yet pruned.
    pub fn hit_count(&self, key: &str) -> usize {
        self.store.hits(key).map_or(0, |hits| hits.len())
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The limiter's clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }
}
