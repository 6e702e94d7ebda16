//! Slidegate - Per-key Sliding-Window Rate Limiting
//!
//! This crate throttles write-heavy and abuse-prone actions (note writes,
//! comments, uploads, searches, profile edits, login attempts). Each action
//! has a `{limit, window}` policy; each caller key keeps a log of admission
//! timestamps that slides continuously with the clock. A background sweeper
//! drops logs that have gone quiet.

pub mod config;
pub mod error;
pub mod ratelimit;

pub use error::{Result, SlidegateError};
pub use ratelimit::{Action, Decision, Policy, QuotaStatus, RateLimiter};
