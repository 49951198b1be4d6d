//! Timer Module
//!
//! Logical clock used for insertion timestamps, access timestamps and expiry
//! checks. Replaceable so tests can advance time explicitly.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// == Timer Trait ==
/// Source of the current logical time in nanoseconds.
///
/// Implementations must never go backwards.
pub trait Timer: Send + Sync + Debug {
    fn now(&self) -> u64;
}

// == Monotonic Timer ==
/// Wall clock backed by [`Instant`], counting nanoseconds since creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTimer {
    origin: Instant,
}

impl MonotonicTimer {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for MonotonicTimer {
    fn now(&self) -> u64 {
        // Saturates after ~584 years of uptime.
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

// == Manual Timer ==
/// Settable clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualTimer {
    nanos: AtomicU64,
}

impl ManualTimer {
    /// Creates a timer frozen at `start` nanoseconds.
    pub fn new(start: u64) -> Self {
        Self {
            nanos: AtomicU64::new(start),
        }
    }

    /// Moves the clock to `nanos`. Earlier values are ignored.
    pub fn set(&self, nanos: u64) {
        self.nanos.fetch_max(nanos, Ordering::SeqCst);
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        // fetch_update never fails with a Some-returning closure
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(by))
            });
    }
}

impl Timer for ManualTimer {
    fn now(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_timer_never_decreases() {
        let timer = MonotonicTimer::new();
        let first = timer.now();
        let second = timer.now();
        assert!(second >= first);
    }

    #[test]
    fn test_manual_timer_set_and_advance() {
        let timer = ManualTimer::new(100);
        assert_eq!(timer.now(), 100);

        timer.advance(Duration::from_nanos(50));
        assert_eq!(timer.now(), 150);

        timer.set(1_000);
        assert_eq!(timer.now(), 1_000);
    }

    #[test]
    fn test_manual_timer_ignores_backwards_set() {
        let timer = ManualTimer::new(500);
        timer.set(10);
        assert_eq!(timer.now(), 500);
    }
}
