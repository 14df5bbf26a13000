//! Interrupt
//!
//! The simulated processor has a single interrupt line, driven by the
//! [`timer`](crate::timer). Kernel code controls it through the interrupt flag:
//! masking it is the only way to make a sequence of operations atomic with
//! respect to the timer handler.
#[cfg(doc)]
use crate::spinlock::SpinLockGuard;
use crate::cpu;
use core::marker::PhantomData;

/// Enumeration representing the interrupt state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InterruptState {
    /// Interrupts are enabled.
    On,
    /// Interrupts are disabled.
    Off,
}

impl InterruptState {
    /// Reads the current interrupt state.
    ///
    /// # Returns
    /// - [`InterruptState::On`] if interrupts are enabled, or if the caller
    ///   does not run on a simulated processor.
    /// - [`InterruptState::Off`] if interrupts are disabled.
    pub fn current() -> Self {
        match cpu::current() {
            Some(cpu) if !cpu.interrupts_enabled() => Self::Off,
            _ => Self::On,
        }
    }

    /// Masks interrupts and returns the state before masking.
    ///
    /// Pass the returned state to [`InterruptState::restore`] to undo the
    /// masking. Calls nest: only the outermost restore unmasks interrupts.
    pub fn disable() -> Self {
        cpu::current().map_or(Self::On, |cpu| cpu.disable_interrupts())
    }

    /// Restores the interrupt state saved by [`InterruptState::disable`].
    ///
    /// Unmasking interrupts advances the clock by one kernel tick and delivers
    /// a timer interrupt if one is due.
    pub fn restore(self) {
        if let Some(cpu) = cpu::current() {
            cpu.restore_interrupts(self);
        }
    }

    /// Unmasks interrupts.
    pub fn enable() {
        Self::On.restore()
    }
}

/// An RAII-based guard for managing interrupt disabling.
///
/// When an `InterruptGuard` is created, interrupts are disabled. When it is
/// dropped, the interrupt state is restored to what it was before the guard was
/// created.
///
/// **Important:**
/// - [`InterruptGuard`] instances **must be dropped in reverse order of their
///   creation** to prevent unintended interrupt state changes.
/// - Due to Rust's ownership and scoping rules, this invariant is naturally
///   upheld unless `drop()` is explicitly called prematurely or an
///   [`InterruptGuard`] is stored in a struct field such as
///   [`SpinLockGuard`].
///
/// This structure is created using [`InterruptGuard::new`].
pub struct InterruptGuard {
    prior: InterruptState,
    _not_send: PhantomData<*const ()>,
}

impl InterruptGuard {
    /// Creates a new `InterruptGuard`, disabling interrupts.
    ///
    /// # Example
    /// ```rust
    /// use abyss::interrupt::InterruptGuard;
    ///
    /// let _guard = InterruptGuard::new(); // Disables interrupts
    /// // Critical section...
    /// // Interrupts are restored when `_guard` goes out of scope.
    /// ```
    pub fn new() -> Self {
        Self {
            prior: InterruptState::disable(),
            _not_send: PhantomData,
        }
    }

    /// Forgets the guard, leaving interrupts masked.
    ///
    /// Used on paths that never return to the guarded scope, such as
    /// thread exit.
    pub fn consume(self) {
        core::mem::forget(self);
    }

    /// Returns true if interrupts are currently masked.
    pub fn is_guarded() -> bool {
        InterruptState::current() == InterruptState::Off
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.prior.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cpu, MachineConfig};

    #[test]
    fn off_cpu_is_always_on() {
        assert_eq!(InterruptState::current(), InterruptState::On);
        let guard = InterruptGuard::new();
        assert!(!InterruptGuard::is_guarded());
        drop(guard);
    }

    #[test]
    fn nested_guards_restore_outermost() {
        cpu::enter(Cpu::new(MachineConfig::default()));
        InterruptState::enable();
        let start = crate::clock::now();

        let outer = InterruptGuard::new();
        let inner = InterruptGuard::new();
        assert!(InterruptGuard::is_guarded());
        drop(inner);
        // Still masked by the outer guard; time does not move.
        assert!(InterruptGuard::is_guarded());
        assert_eq!(crate::clock::now(), start);
        drop(outer);

        assert_eq!(InterruptState::current(), InterruptState::On);
        assert_eq!(
            crate::clock::now(),
            start + MachineConfig::default().kernel_tick
        );
    }
}
