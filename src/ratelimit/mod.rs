//! Sliding-window rate limiting: policies, request logs, and eviction.

mod clock;
mod key;
mod limiter;
mod policy;
mod store;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::LimitKey;
pub use limiter::{Code, Decision, QuotaStatus, RateLimiter};
pub use policy::{Action, Policy, PolicyTable};
pub use store::{RequestLog, RequestLogStore};
pub use sweeper::{Sweeper, SweeperHandle};
