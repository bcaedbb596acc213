//! Rate limiting logic and state management.

mod clock;
mod key;
mod limiter;
mod policy;
mod rules;
mod store;
mod sweeper;
mod window;

pub use clock::{Clock, MockClock, SystemClock};
pub use key::RateLimitKey;
pub use limiter::RateLimiter;
pub use policy::{PolicySpec, WindowPolicy, DEFAULT_LIMIT, DEFAULT_WINDOW};
pub use rules::{PolicyRule, PolicyRules};
pub use store::{InMemoryKeyStore, KeyStore};
pub use sweeper::{Sweeper, SweeperConfig};
pub use window::{decide, evaluate, window_start, Decision, WindowCount};
