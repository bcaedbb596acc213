use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use turnstile::ratelimit::{
    Clock, InMemoryKeyStore, MockClock, PolicyRules, RateLimitKey, RateLimiter, WindowPolicy,
};

fn mock_limiter() -> (RateLimiter<InMemoryKeyStore, MockClock>, MockClock) {
    let clock = MockClock::new(Instant::now());
    (RateLimiter::with_clock(clock.clone()), clock)
}

fn policy(limit: u64, window_ms: u64) -> Option<WindowPolicy> {
    Some(WindowPolicy::from_millis(limit, window_ms).unwrap())
}

#[test]
fn two_per_second_scenario() {
    let (limiter, clock) = mock_limiter();
    let start = clock.now();
    let at = |ms: u64| clock.set(start + Duration::from_millis(ms));
    let p = policy(2, 1000);

    at(0);
    let d = limiter.check("k", p);
    assert_eq!((d.allowed, d.count, d.remaining), (true, 1, 1));

    at(100);
    let d = limiter.check("k", p);
    assert_eq!((d.allowed, d.count, d.remaining), (true, 2, 0));

    at(200);
    let d = limiter.check("k", p);
    assert_eq!((d.allowed, d.count, d.remaining), (false, 3, 0));
    assert_eq!(d.reset_ms(), 800);

    // Denied attempts are recorded, so the hits at 100 and 200 still count.
    at(1001);
    let d = limiter.check("k", p);
    assert_eq!((d.allowed, d.count, d.remaining), (false, 3, 0));
    assert_eq!(d.reset_ms(), 99);

    // Everything before 1201 has left the window.
    at(2201);
    let d = limiter.check("k", p);
    assert_eq!((d.allowed, d.count, d.remaining), (true, 1, 1));
    assert_eq!(d.reset_ms(), 1000);
}

#[test]
fn prior_hits_expire_after_window() {
    let (limiter, clock) = mock_limiter();
    let p = policy(3, 1000);

    for _ in 0..3 {
        assert!(limiter.check("burst", p).allowed);
    }
    assert!(!limiter.check("burst", p).allowed);

    clock.advance(Duration::from_millis(1001));
    let d = limiter.check("burst", p);
    assert!(d.allowed);
    assert_eq!(d.count, 1);
}

#[test]
fn hit_on_window_boundary_is_not_counted() {
    let (limiter, clock) = mock_limiter();
    let p = policy(1, 1000);

    assert!(limiter.check("edge", p).allowed);
    clock.advance(Duration::from_millis(1000));

    let d = limiter.check("edge", p);
    assert!(d.allowed);
    assert_eq!(d.count, 1);
}

#[test]
fn idle_eviction_keeps_hits_that_still_count() {
    let (limiter, clock) = mock_limiter();
    let hourly = policy(1, 3_600_000);

    assert!(limiter.check("export", hourly).allowed);
    limiter.check("ping", policy(5, 1000));
    clock.advance(Duration::from_secs(301));

    assert_eq!(limiter.evict_idle(Duration::from_secs(300)), 1);
    assert_eq!(limiter.key_count(), 1);
    assert!(!limiter.check("export", hourly).allowed);
}

#[test]
fn keys_are_isolated() {
    let (limiter, _) = mock_limiter();
    let p = policy(1, 60_000);

    assert!(limiter.check("a", p).allowed);
    assert!(!limiter.check("a", p).allowed);

    let d = limiter.check("b", p);
    assert!(d.allowed);
    assert_eq!(d.count, 1);
}

#[test]
fn remaining_is_zero_whenever_denied() {
    let (limiter, _) = mock_limiter();
    let p = policy(4, 60_000);

    for _ in 0..10 {
        let d = limiter.check("k", p);
        assert!(d.remaining <= d.limit);
        if d.allowed {
            assert_eq!(d.remaining, d.limit - d.count);
        } else {
            assert_eq!(d.remaining, 0);
        }
    }
}

#[test]
fn reset_makes_key_fresh() {
    let (limiter, _) = mock_limiter();
    let p = policy(2, 60_000);

    for _ in 0..5 {
        limiter.check("k", p);
    }
    limiter.reset(Some("k"));

    let d = limiter.check("k", p);
    assert!(d.allowed);
    assert_eq!(d.count, 1);
    assert_eq!(d.remaining, 1);
}

#[test]
fn require_reports_retry_after() {
    let (limiter, clock) = mock_limiter();
    let p = policy(1, 1000);

    assert!(limiter.require("job:42", p).is_ok());
    clock.advance(Duration::from_millis(250));

    let err = limiter.require("job:42", p).unwrap_err();
    assert_eq!(err.status(), 429);
    assert_eq!(err.retry_after_ms(), 750);
    assert_eq!(err.decision().count, 2);
}

#[test]
fn structured_keys_and_rules() {
    let (limiter, _) = mock_limiter();
    let rules = PolicyRules::from_yaml(
        r#"
rules:
  - prefix: "login:"
    limit: 1
    window_ms: 60000
"#,
    )
    .unwrap();
    limiter.set_rules(rules);

    let key = RateLimitKey::new("login").with("ip", "10.0.0.1");
    assert!(limiter.check(&key, None).allowed);
    assert!(!limiter.check(&key, None).allowed);
    assert_eq!(limiter.hit_count(key.as_str()), 2);
}

#[test]
fn concurrent_checks_admit_exactly_limit() {
    const LIMIT: u64 = 50;
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;

    let limiter = Arc::new(RateLimiter::new());
    let allowed = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));
    let p = policy(LIMIT, 60_000);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let limiter = limiter.clone();
            let allowed = allowed.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..PER_THREAD {
                    if limiter.check("hot", p).allowed {
                        allowed.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(allowed.load(Ordering::SeqCst), LIMIT);
    assert_eq!(limiter.hit_count("hot"), THREADS * PER_THREAD);
}

#[test]
fn concurrent_checks_on_distinct_keys() {
    let limiter = Arc::new(RateLimiter::new());
    let p = policy(3, 60_000);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let limiter = limiter.clone();
            thread::spawn(move || {
                let key = format!("user:{}", i);
                (0..5).filter(|_| limiter.check(&key, p).allowed).count()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 3);
    }
    assert_eq!(limiter.key_count(), 16);
}
