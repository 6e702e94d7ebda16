//! Per-key request logs.
//!
//! Each key owns an ordered sequence of admission timestamps. The map is
//! sharded, so a read-modify-write on one key holds only that key's shard
//! lock and never blocks checks on keys in other shards.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// The admission timestamps recorded for one key.
///
/// Timestamps are non-decreasing from front to back. The limiter reads the
/// clock while holding the key's lock, which keeps that ordering intact.
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    timestamps: VecDeque<Instant>,
    /// Widest window this log has been admitted under
    widest_window: Duration,
}

impl RequestLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every timestamp at least `window` old. Returns how many were dropped.
    pub fn prune(&mut self, now: Instant, window: Duration) -> usize {
        let mut dropped = 0;
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.timestamps.pop_front();
                dropped += 1;
            } else {
                break;
            }
        }
        dropped
    }

    /// Remember `window` if it is the widest seen so far.
    ///
    /// A sweep never prunes this log with anything shorter.
    pub fn observe_window(&mut self, window: Duration) {
        self.widest_window = self.widest_window.max(window);
    }

    /// The widest window this log has been admitted under.
    pub fn widest_window(&self) -> Duration {
        self.widest_window
    }

    /// Record an admission at `now`.
    pub fn record(&mut self, now: Instant) {
        self.timestamps.push_back(now);
    }

    /// The oldest recorded timestamp.
    pub fn oldest(&self) -> Option<Instant> {
        self.timestamps.front().copied()
    }

    /// Number of recorded timestamps.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the log holds no timestamps.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Thread-safe store of request logs keyed by string.
#[derive(Debug, Default)]
pub struct RequestLogStore {
    logs: DashMap<String, RequestLog>,
}

impl RequestLogStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            logs: DashMap::new(),
        }
    }

    /// Run `f` with exclusive access to the log for `key`, creating it if absent.
    pub fn with_log<F, R>(&self, key: &str, f: F) -> R
    where
        F: FnOnce(&mut RequestLog) -> R,
    {
        if let Some(mut log) = self.logs.get_mut(key) {
            return f(log.value_mut());
        }

        let mut log = self.logs.entry(key.to_string()).or_default();
        f(log.value_mut())
    }

    /// Run `f` with exclusive access to the log for `key` if one exists.
    ///
    /// Never creates an entry.
    pub fn with_existing_log<F, R>(&self, key: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut RequestLog) -> R,
    {
        self.logs.get_mut(key).map(|mut log| f(log.value_mut()))
    }

    /// Whether a log exists for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.logs.contains_key(key)
    }

    /// Remove the log for `key`. Returns whether one existed.
    pub fn remove(&self, key: &str) -> bool {
        self.logs.remove(key).is_some()
    }

    /// Remove every log.
    pub fn clear(&self) {
        self.logs.clear();
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Prune every log and delete the ones left empty.
    ///
    /// Each log is pruned with `max_age` or its widest window, whichever is
    /// longer, so timestamps that still count are never dropped. Locks one
    /// shard at a time. Returns the number of deleted keys.
    pub fn sweep(&self, now: Instant, max_age: Duration) -> usize {
        let mut removed = 0;
        self.logs.retain(|_, log| {
            log.prune(now, max_age.max(log.widest_window));
            if log.is_empty() {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }
}
