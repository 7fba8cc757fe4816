//! Time utilities for the RDT protocol
//!
//! Timers in RDT are software deadlines compared against a [`Clock`] once
//! per loop iteration; nothing is scheduled on an OS timer. Swapping the
//! system clock for a [`ManualClock`] makes a whole transfer deterministic.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of monotonic time
pub trait Clock {
    /// Current instant
    fn now(&self) -> Instant;
}

/// The monotonic system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock
///
/// Clones share the same time, so a sender, a receiver and a
/// [`MemoryLink`](crate::memory::MemoryLink) can all observe one timeline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant
    pub fn new() -> Self {
        ManualClock {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

impl<K: Clock + ?Sized> Clock for Arc<K> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Timer for periodic operations
///
/// Used for keep-alive frames and progress reports.
#[derive(Debug, Clone)]
pub struct Timer {
    interval: Duration,
    last_fire: Instant,
}

impl Timer {
    /// Create a new timer with the given interval, starting at `now`
    pub fn new(interval: Duration, now: Instant) -> Self {
        Timer {
            interval,
            last_fire: now,
        }
    }

    /// Check if the timer has expired
    pub fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_fire) >= self.interval
    }

    /// Reset the timer
    pub fn reset(&mut self, now: Instant) {
        self.last_fire = now;
    }

    /// Get time until next expiration
    pub fn time_until_expiration(&self, now: Instant) -> Duration {
        self.interval
            .saturating_sub(now.saturating_duration_since(self.last_fire))
    }

    /// Fire the timer if expired, returning true if it fired
    pub fn try_fire(&mut self, now: Instant) -> bool {
        if self.expired(now) {
            self.reset(now);
            true
        } else {
            false
        }
    }

    /// Configured interval
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new();
        let other = clock.clone();
        let start = clock.now();

        other.advance(Duration::from_millis(25));
        assert_eq!(clock.now() - start, Duration::from_millis(25));
    }

    #[test]
    fn test_timer() {
        let clock = ManualClock::new();
        let mut timer = Timer::new(Duration::from_millis(10), clock.now());
        assert!(!timer.expired(clock.now()));

        clock.advance(Duration::from_millis(10));
        assert!(timer.expired(clock.now()));

        timer.reset(clock.now());
        assert!(!timer.expired(clock.now()));
    }

    #[test]
    fn test_timer_try_fire() {
        let clock = ManualClock::new();
        let mut timer = Timer::new(Duration::from_millis(10), clock.now());
        assert!(!timer.try_fire(clock.now()));

        clock.advance(Duration::from_millis(11));
        assert!(timer.try_fire(clock.now()));
        assert!(!timer.try_fire(clock.now())); // Should not fire again immediately
    }

    #[test]
    fn test_time_until_expiration() {
        let clock = ManualClock::new();
        let timer = Timer::new(Duration::from_millis(10), clock.now());

        clock.advance(Duration::from_millis(4));
        assert_eq!(
            timer.time_until_expiration(clock.now()),
            Duration::from_millis(6)
        );

        clock.advance(Duration::from_millis(20));
        assert_eq!(timer.time_until_expiration(clock.now()), Duration::ZERO);
    }
}
