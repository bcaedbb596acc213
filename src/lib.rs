//! Turnstile - key-scoped sliding-window admission control.
//!
//! A [`RateLimiter`](ratelimit::RateLimiter) records every attempt made under
//! a caller-chosen key and admits it only while the number of attempts inside
//! the rolling window stays within the policy's limit. Each decision reports
//! the remaining capacity and how long until the oldest counted attempt
//! expires.
//!
//! ```
//! use turnstile::ratelimit::{RateLimiter, WindowPolicy};
//!
//! let limiter = RateLimiter::new();
//! let policy = WindowPolicy::from_millis(2, 1000).unwrap();
//!
//! assert!(limiter.check("login:alice", Some(policy)).allowed);
//! assert!(limiter.check("login:alice", Some(policy)).allowed);
//! assert!(limiter.require("login:alice", Some(policy)).is_err());
//! ```

pub mod config;
pub mod error;
pub mod ratelimit;

pub use error::{RateLimitExceeded, Result, TurnstileError};
pub use ratelimit::{Decision, RateLimiter, WindowPolicy};
