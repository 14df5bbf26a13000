//! The periodic timer device.
//!
//! The timer raises an interrupt every `period` ticks. With a seed, each
//! interval is instead drawn uniformly from `1..=2 * period`, which keeps the
//! mean rate while shaking out code that depends on exact interrupt timing.
use crate::spinlock::SpinLock;
use core::sync::atomic::{AtomicU64, Ordering};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::sync::Arc;

/// A routine run on every timer interrupt.
pub type InterruptHandler = Arc<dyn Fn() + Send + Sync>;

/// A timer device.
pub struct Timer {
    next_fire: AtomicU64,
    period: u64,
    rng: Option<SpinLock<StdRng>>,
    handler: SpinLock<Option<InterruptHandler>>,
}

impl Timer {
    /// Creates a timer whose first interrupt is due one interval after boot.
    pub fn new(period: u64, seed: Option<u64>) -> Self {
        let timer = Self {
            next_fire: AtomicU64::new(0),
            period,
            rng: seed.map(|seed| SpinLock::new(StdRng::seed_from_u64(seed))),
            handler: SpinLock::new(None),
        };
        timer.next_fire.store(timer.interval(), Ordering::SeqCst);
        timer
    }

    fn interval(&self) -> u64 {
        match &self.rng {
            Some(rng) => {
                let mut guard = rng.lock();
                let interval = guard.gen_range(1..=2 * self.period);
                guard.unlock();
                interval
            }
            None => self.period,
        }
    }

    /// The tick at which the next interrupt is raised.
    pub fn next_fire(&self) -> u64 {
        self.next_fire.load(Ordering::SeqCst)
    }

    /// Installs the interrupt handler, returning the previous one.
    ///
    /// `None` uninstalls the handler; the timer keeps ticking.
    pub fn set_interrupt_handler(
        &self,
        handler: Option<InterruptHandler>,
    ) -> Option<InterruptHandler> {
        let mut guard = self.handler.lock();
        let prev = core::mem::replace(&mut *guard, handler);
        guard.unlock();
        prev
    }

    /// The installed interrupt handler.
    pub fn handler(&self) -> Option<InterruptHandler> {
        let guard = self.handler.lock();
        let handler = guard.clone();
        guard.unlock();
        handler
    }

    /// Raises the interrupt if it is due at `now`, re-arming the timer.
    ///
    /// Returns true if the interrupt was raised.
    pub fn fire_if_due(&self, now: u64) -> bool {
        if self.next_fire() > now {
            return false;
        }
        self.next_fire.store(now + self.interval(), Ordering::SeqCst);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::Timer;

    #[test]
    fn periodic() {
        let timer = Timer::new(500, None);
        assert_eq!(timer.next_fire(), 500);
        assert!(!timer.fire_if_due(499));
        assert!(timer.fire_if_due(500));
        assert_eq!(timer.next_fire(), 1000);
    }

    #[test]
    fn jitter_stays_in_range() {
        let timer = Timer::new(50, Some(7));
        let mut now = 0;
        for _ in 0..1000 {
            now = timer.next_fire();
            assert!(timer.fire_if_due(now));
            let interval = timer.next_fire() - now;
            assert!((1..=100).contains(&interval), "interval {interval}");
        }
        assert!(now > 0);
    }

    #[test]
    fn jitter_is_reproducible() {
        let a = Timer::new(500, Some(42));
        let b = Timer::new(500, Some(42));
        for _ in 0..16 {
            let now = a.next_fire();
            assert_eq!(now, b.next_fire());
            a.fire_if_due(now);
            b.fire_if_due(now);
        }
    }
}
