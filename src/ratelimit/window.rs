//! Sliding-window evaluation.

use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};

use super::policy::WindowPolicy;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Whether the attempt may proceed
    pub allowed: bool,
    /// Admissions left in the current window
    pub remaining: u64,
    /// Time until the oldest counted hit leaves the window
    #[serde(rename = "resetMs", serialize_with = "serialize_millis")]
    pub reset_after: Duration,
    /// Limit of the policy that produced this decision
    pub limit: u64,
    /// Hits inside the window, including the one being evaluated
    pub count: u64,
}

impl Decision {
    /// `reset_after` in milliseconds, rounded up so that waiting this long
    /// is always enough for the oldest hit to expire.
    pub fn reset_ms(&self) -> u64 {
        duration_to_ms_ceil(self.reset_after)
    }
}

fn duration_to_ms_ceil(duration: Duration) -> u64 {
    let ms = duration.as_nanos().div_ceil(1_000_000);
    u64::try_from(ms).unwrap_or(u64::MAX)
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration_to_ms_ceil(*duration))
}

/// The part of a key's hit log that falls inside the current window.
///
/// Stores compute this while they still hold the key's lock, so a check
/// never has to copy the log out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCount {
    /// Hits strictly newer than the window start
    pub count: u64,
    /// Earliest of those hits
    pub oldest: Option<Instant>,
}

impl WindowCount {
    /// Count the hits newer than `window_start`; `None` counts everything.
    pub fn from_hits(hits: &[Instant], window_start: Option<Instant>) -> Self {
        let mut count = 0;
        let mut oldest: Option<Instant> = None;
        for &ts in hits {
            if window_start.is_some_and(|start| ts <= start) {
                continue;
            }
            count += 1;
            oldest = Some(oldest.map_or(ts, |o| o.min(ts)));
        }
        Self { count, oldest }
    }
}

/// Start of the window ending at `now`.
///
/// `None` when the clock origin is younger than the window, in which case
/// nothing can have expired yet.
pub fn window_start(now: Instant, window: Duration) -> Option<Instant> {
    now.checked_sub(window)
}

/// Turn a window count (which already includes the hit being evaluated)
/// into a decision.
pub fn decide(live: WindowCount, now: Instant, policy: &WindowPolicy) -> Decision {
    let limit = policy.limit();
    let reset_after = live.oldest.map_or(Duration::ZERO, |oldest| {
        policy
            .window()
            .saturating_sub(now.saturating_duration_since(oldest))
    });

    Decision {
        allowed: live.count <= limit,
        remaining: limit.saturating_sub(live.count),
        reset_after,
        limit,
        count: live.count,
    }
}

/// Decide admission from a full hit log.
///
/// Only hits strictly newer than `now - window` are counted, so a hit that
/// sits exactly on the window boundary has already expired.
pub fn evaluate(hits: &[Instant], now: Instant, policy: &WindowPolicy) -> Decision {
    let live = WindowCount::from_hits(hits, window_start(now, policy.window()));
    decide(live, now, policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(limit: u64, window_ms: u64) -> WindowPolicy {
        WindowPolicy::from_millis(limit, window_ms).unwrap()
    }

    fn at(base: Instant, offsets: &[u64]) -> Vec<Instant> {
        offsets
            .iter()
            .map(|ms| base + Duration::from_millis(*ms))
            .collect()
    }

    #[test]
    fn test_single_hit_is_allowed() {
        let t0 = Instant::now();
        let decision = evaluate(&[t0], t0, &policy(3, 1000));

        assert!(decision.allowed);
        assert_eq!(decision.count, 1);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.limit, 3);
        assert_eq!(decision.reset_after, Duration::from_millis(1000));
    }

    #[test]
    fn test_limit_th_hit_allowed_next_denied() {
        let t0 = Instant::now();
        let p = policy(2, 1000);

        let second = evaluate(&at(t0, &[0, 100]), t0 + Duration::from_millis(100), &p);
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = evaluate(&at(t0, &[0, 100, 200]), t0 + Duration::from_millis(200), &p);
        assert!(!third.allowed);
        assert_eq!(third.count, 3);
        assert_eq!(third.remaining, 0);
        assert_eq!(third.reset_after, Duration::from_millis(800));
    }

    #[test]
    fn test_boundary_hit_is_excluded() {
        let t0 = Instant::now();
        let now = t0 + Duration::from_millis(1000);

        // First hit sits exactly at now - window.
        let decision = evaluate(&at(t0, &[0, 1000]), now, &policy(1, 1000));

        assert_eq!(decision.count, 1);
        assert!(decision.allowed);
    }

    #[test]
    fn test_reset_after_tracks_oldest_live_hit() {
        let t0 = Instant::now();
        let now = t0 + Duration::from_millis(1500);

        let decision = evaluate(&at(t0, &[0, 700, 1200, 1500]), now, &policy(10, 1000));

        assert_eq!(decision.count, 3);
        assert_eq!(decision.reset_after, Duration::from_millis(200));
    }

    #[test]
    fn test_empty_window_resets_immediately() {
        let t0 = Instant::now();
        let now = t0 + Duration::from_secs(5);

        let decision = evaluate(&at(t0, &[0, 10]), now, &policy(1, 1000));

        assert_eq!(decision.count, 0);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
        assert_eq!(decision.reset_after, Duration::ZERO);
    }

    #[test]
    fn test_decide_with_no_live_hits() {
        let now = Instant::now();
        let decision = decide(WindowCount::default(), now, &policy(2, 1000));

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_after, Duration::ZERO);
    }

    #[test]
    fn test_window_count_from_unsorted_hits() {
        let t0 = Instant::now();
        let hits = at(t0, &[300, 100, 200, 50]);

        let live = WindowCount::from_hits(&hits, Some(t0 + Duration::from_millis(100)));

        assert_eq!(live.count, 2);
        assert_eq!(live.oldest, Some(t0 + Duration::from_millis(200)));
        assert_eq!(WindowCount::from_hits(&hits, None).count, 4);
    }

    #[test]
    fn test_reset_ms_rounds_up() {
        let decision = Decision {
            allowed: true,
            remaining: 1,
            reset_after: Duration::from_micros(1500),
            limit: 2,
            count: 1,
        };
        assert_eq!(decision.reset_ms(), 2);
    }

    #[test]
    fn test_decision_serializes_wire_shape() {
        let decision = Decision {
            allowed: false,
            remaining: 0,
            reset_after: Duration::from_millis(800),
            limit: 2,
            count: 3,
        };

        let json = serde_json::to_value(decision).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "allowed": false,
                "remaining": 0,
                "resetMs": 800,
                "limit": 2,
                "count": 3
            })
        );
    }
}
