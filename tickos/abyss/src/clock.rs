//! The virtual clock.
//!
//! Time is measured in ticks since the processor was powered on. The clock is
//! monotonic: it only moves forward, by one kernel tick whenever interrupts
//! are re-enabled, or in a jump to the next timer interrupt when the processor
//! idles.

use core::sync::atomic::{AtomicU64, Ordering};

/// A monotonic tick counter.
#[derive(Default)]
pub struct Clock {
    ticks: AtomicU64,
}

impl Clock {
    /// Creates a clock reading zero.
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
        }
    }

    /// Reads the clock.
    pub fn now(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Advances the clock by `delta` ticks and returns the new time.
    pub fn advance(&self, delta: u64) -> u64 {
        self.ticks.fetch_add(delta, Ordering::SeqCst) + delta
    }

    /// Moves the clock to `tick` if it is in the future.
    ///
    /// Returns the new time.
    pub fn advance_to(&self, tick: u64) -> u64 {
        self.ticks.fetch_max(tick, Ordering::SeqCst).max(tick)
    }
}

/// Reads the clock of the processor the caller runs on.
///
/// # Panics
/// Panics when called outside of a simulated processor.
pub fn now() -> u64 {
    crate::cpu::this().now()
}

#[cfg(test)]
mod tests {
    use super::Clock;

    #[test]
    fn advance_is_monotonic() {
        let clock = Clock::new();
        assert_eq!(clock.advance(10), 10);
        assert_eq!(clock.advance_to(500), 500);
        // Jumping backwards is ignored.
        assert_eq!(clock.advance_to(20), 500);
        assert_eq!(clock.now(), 500);
    }
}
