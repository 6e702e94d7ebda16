//! Core sliding-window rate limiter.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use super::clock::{Clock, SystemClock};
use super::key::LimitKey;
use super::policy::{Action, Policy, PolicyTable};
use super::store::{RequestLog, RequestLogStore};
use crate::error::{Result, SlidegateError};

/// Outcome code of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    /// The request was admitted and recorded
    Ok,
    /// The key has used up its quota for the current window
    OverLimit,
}

/// Quota state for one key under one policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    /// Admissions allowed per window
    pub limit: u32,
    /// Admissions left in the current window
    pub remaining: u32,
    /// Milliseconds until the oldest counted admission leaves the window
    pub reset_time_ms: u64,
    /// Wall-clock instant at which that happens
    pub reset_at: DateTime<Utc>,
}

impl QuotaStatus {
    fn new(limit: u32, count: usize, reset_in: Duration) -> Self {
        let reset_at = chrono::Duration::from_std(reset_in)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or_else(Utc::now);

        Self {
            limit,
            remaining: remaining_quota(limit, count),
            reset_time_ms: ceil_millis(reset_in),
            reset_at,
        }
    }
}

/// Result of an action-level admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// The storage key that was checked
    pub key: String,
    /// Whether the request was admitted
    pub code: Code,
    /// Quota state right after the check
    #[serde(flatten)]
    pub status: QuotaStatus,
}

impl Decision {
    /// Whether the request was admitted.
    pub fn is_allowed(&self) -> bool {
        self.code == Code::Ok
    }
}

/// What a single admission check observed while holding the key's lock.
#[derive(Debug, Clone, Copy)]
struct Admission {
    allowed: bool,
    count: usize,
    reset_in: Duration,
}

/// The sliding-window rate limiter.
///
/// One instance is built by the application's composition root and shared
/// (usually behind an `Arc`) by every caller. All methods take `&self` and
/// are safe to call from many threads at once.
#[derive(Debug)]
pub struct RateLimiter {
    /// Request logs indexed by storage key
    store: RequestLogStore,
    /// Injected time source
    clock: Arc<dyn Clock>,
    /// Policies for named actions
    policies: PolicyTable,
}

impl RateLimiter {
    /// Create a limiter with the default policy table and the system clock.
    pub fn new() -> Self {
        Self::with_policies(PolicyTable::new(), None)
    }

    /// Create a limiter with the default policy table and the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_policies(PolicyTable::new(), Some(clock))
    }

    /// Create a limiter with an explicit policy table.
    ///
    /// Falls back to the system clock when `clock` is `None`.
    pub fn with_policies(policies: PolicyTable, clock: Option<Arc<dyn Clock>>) -> Self {
        Self {
            store: RequestLogStore::new(),
            clock: clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            policies,
        }
    }

    /// Check a key against a policy and record the request if admitted.
    ///
    /// Timestamps at least one window old are discarded whether or not the
    /// request is admitted.
    pub fn is_allowed(&self, key: &str, policy: &Policy) -> Result<bool> {
        Ok(self.admit(key, policy)?.allowed)
    }

    /// Admissions left for `key` in the current window. Never records a request.
    pub fn remaining_requests(&self, key: &str, policy: &Policy) -> Result<u32> {
        validate_key(key)?;
        policy.validate()?;

        let window = policy.window();
        let count = self
            .store
            .with_existing_log(key, |log| {
                log.prune(self.clock.now(), window);
                log.len()
            })
            .unwrap_or(0);

        Ok(remaining_quota(policy.limit, count))
    }

    /// Time until the oldest request for `key` still inside `window` leaves it.
    ///
    /// Only the window matters here, so the limit is not consulted. Zero when
    /// nothing is recorded for the key.
    pub fn reset_time(&self, key: &str, window: Duration) -> Result<Duration> {
        validate_key(key)?;
        validate_window(window)?;

        let reset_in = self
            .store
            .with_existing_log(key, |log| {
                let now = self.clock.now();
                log.prune(now, window);
                time_until_reset(log, now, window)
            })
            .unwrap_or(Duration::ZERO);

        Ok(reset_in)
    }

    /// Discard the request log for `key`.
    pub fn reset(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        if self.store.remove(key) {
            debug!(key = %key, "Request log reset");
        }
        Ok(())
    }

    /// Discard every request log.
    pub fn reset_all(&self) {
        let dropped = self.store.len();
        self.store.clear();
        info!(dropped_keys = dropped, "All request logs reset");
    }

    /// Check `subject` against the policy registered for `action`.
    pub fn check(&self, action: Action, subject: &str) -> Result<Decision> {
        let key = LimitKey::new(action, subject)?;
        let policy = self.policies.get(action);
        let storage_key = key.to_string_key();

        let admission = self.admit(&storage_key, &policy)?;

        Ok(Decision {
            key: storage_key,
            code: if admission.allowed { Code::Ok } else { Code::OverLimit },
            status: QuotaStatus::new(policy.limit, admission.count, admission.reset_in),
        })
    }

    /// Like [`check`](Self::check), resolving the action by name first.
    pub fn check_named(&self, action_name: &str, subject: &str) -> Result<Decision> {
        let (action, _) = self.policies.lookup(action_name)?;
        self.check(action, subject)
    }

    /// Quota state for `subject` under `action`, without recording a request.
    pub fn status(&self, action: Action, subject: &str) -> Result<QuotaStatus> {
        let key = LimitKey::new(action, subject)?;
        let policy = self.policies.get(action);
        let window = policy.window();

        let (count, reset_in) = self
            .store
            .with_existing_log(&key.to_string_key(), |log| {
                let now = self.clock.now();
                log.prune(now, window);
                (log.len(), time_until_reset(log, now, window))
            })
            .unwrap_or((0, Duration::ZERO));

        Ok(QuotaStatus::new(policy.limit, count, reset_in))
    }

    /// Discard the request log for `subject` under `action`.
    pub fn reset_action(&self, action: Action, subject: &str) -> Result<()> {
        let key = LimitKey::new(action, subject)?;
        self.reset(&key.to_string_key())
    }

    /// The policy registered for `action`.
    pub fn policy(&self, action: Action) -> Policy {
        self.policies.get(action)
    }

    /// The full policy table.
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Prune every log with `max_age` and drop the ones left empty.
    ///
    /// Returns the number of keys removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        self.store.sweep(self.clock.now(), max_age)
    }

    /// Number of keys with a request log.
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    /// The prune-then-maybe-append step, done under the key's lock.
    fn admit(&self, key: &str, policy: &Policy) -> Result<Admission> {
        validate_key(key)?;
        policy.validate()?;

        let window = policy.window();
        let limit = policy.limit as usize;

        let admission = self.store.with_log(key, |log| {
            let now = self.clock.now();
            log.observe_window(window);
            log.prune(now, window);

            let allowed = log.len() < limit;
            if allowed {
                log.record(now);
            }

            Admission {
                allowed,
                count: log.len(),
                reset_in: time_until_reset(log, now, window),
            }
        });

        trace!(
            key = %key,
            policy = %policy,
            count = admission.count,
            allowed = admission.allowed,
            "Checked rate limit"
        );

        if !admission.allowed {
            debug!(
                key = %key,
                limit = policy.limit,
                retry_after_ms = ceil_millis(admission.reset_in),
                "Rate limit exceeded"
            );
        }

        Ok(admission)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(SlidegateError::InvalidArgument(
            "key must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_window(window: Duration) -> Result<()> {
    if window.is_zero() {
        return Err(SlidegateError::InvalidArgument(
            "window must be greater than 0 ms".to_string(),
        ));
    }
    Ok(())
}

fn remaining_quota(limit: u32, count: usize) -> u32 {
    let count = u32::try_from(count).unwrap_or(u32::MAX);
    limit.saturating_sub(count)
}

fn time_until_reset(log: &RequestLog, now: Instant, window: Duration) -> Duration {
    log.oldest()
        .map(|oldest| (oldest + window).saturating_duration_since(now))
        .unwrap_or(Duration::ZERO)
}

/// Whole milliseconds, rounded up so a pending reset never reads as zero.
fn ceil_millis(duration: Duration) -> u64 {
    let millis = duration.as_millis() as u64;
    if Duration::from_millis(millis) < duration {
        millis + 1
    } else {
        millis
    }
}
