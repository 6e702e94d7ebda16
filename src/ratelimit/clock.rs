//! Time sources for the limiter.
//!
//! The limiter never calls `Instant::now()` directly; it asks an injected
//! [`Clock`]. Production code uses [`SystemClock`], tests drive a
//! [`ManualClock`] to get deterministic window arithmetic.

use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic time source.
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// System clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can hand one clone to
/// the limiter and keep another to advance time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    current: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a clock frozen at `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self {
            origin: start,
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by `by`.
    pub fn advance(&self, by: Duration) {
        *self.current.lock() += by;
    }

    /// Advance the clock by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Move the clock to `ms` milliseconds after its starting instant.
    ///
    /// Moving backwards is ignored; the clock stays monotonic.
    pub fn set_ms(&self, ms: u64) {
        let target = self.origin + Duration::from_millis(ms);
        let mut current = self.current.lock();
        if target > *current {
            *current = target;
        }
    }

    /// Milliseconds elapsed since the starting instant.
    pub fn elapsed_ms(&self) -> u64 {
        self.current.lock().duration_since(self.origin).as_millis() as u64
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let t1 = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        assert!(clock.now() > t1);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        let start = clock.now();

        handle.advance_ms(250);
        assert_eq!(clock.now(), start + Duration::from_millis(250));
        assert_eq!(clock.elapsed_ms(), 250);
    }

    #[test]
    fn test_manual_clock_set_never_goes_backwards() {
        let clock = ManualClock::new();
        clock.set_ms(1000);
        assert_eq!(clock.elapsed_ms(), 1000);

        clock.set_ms(400);
        assert_eq!(clock.elapsed_ms(), 1000);
    }
}
