//! The simulated processor.
//!
//! A [`Cpu`] owns the clock, the interrupt flag, the timer and the console
//! capture buffer of one machine. Kernel threads are host threads that
//! [`enter`] a cpu; the kernel guarantees that only one of them executes at a
//! time, so the interrupt flag is a single machine-wide bit.
use crate::{
    clock::Clock,
    interrupt::InterruptState,
    timer::Timer,
};
use core::{
    cell::{Cell, RefCell},
    sync::atomic::{AtomicBool, Ordering},
};
use crossbeam_queue::SegQueue;
use std::sync::{Arc, OnceLock};

/// Hardware parameters of a machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MachineConfig {
    /// Ticks between two timer interrupts.
    pub timer_period: u64,
    /// Ticks consumed each time interrupts are re-enabled.
    pub kernel_tick: u64,
    /// Seed of the timer jitter. `None` keeps the timer strictly periodic.
    pub seed: Option<u64>,
    /// The machine halts once the clock reaches this tick.
    pub tick_budget: Option<u64>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            timer_period: 500,
            kernel_tick: 10,
            seed: None,
            tick_budget: Some(100_000_000),
        }
    }
}

thread_local! {
    static CPU: RefCell<Option<Arc<Cpu>>> = const { RefCell::new(None) };
    static IN_PREEMPT: Cell<bool> = const { Cell::new(false) };
}

/// Binds the calling host thread to `cpu`.
pub fn enter(cpu: Arc<Cpu>) {
    CPU.with(|slot| *slot.borrow_mut() = Some(cpu));
}

/// Returns the processor the calling host thread runs on, if any.
pub fn current() -> Option<Arc<Cpu>> {
    CPU.with(|slot| slot.borrow().clone())
}

/// Returns the processor the calling host thread runs on.
///
/// # Panics
/// Panics if the caller never entered a processor.
#[track_caller]
pub fn this() -> Arc<Cpu> {
    current().unwrap_or_else(|| panic!("Not running on a simulated processor."))
}

/// A simulated uniprocessor.
pub struct Cpu {
    config: MachineConfig,
    clock: Clock,
    enabled: AtomicBool,
    in_handler: AtomicBool,
    yield_requested: AtomicBool,
    powered_off: AtomicBool,
    timer: Timer,
    preempt: OnceLock<Box<dyn Fn() + Send + Sync>>,
    capturing: AtomicBool,
    console: SegQueue<String>,
}

impl Cpu {
    /// Powers on a new processor.
    ///
    /// Interrupts start masked; the first thread to run unmasks them.
    pub fn new(config: MachineConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            clock: Clock::new(),
            enabled: AtomicBool::new(false),
            in_handler: AtomicBool::new(false),
            yield_requested: AtomicBool::new(false),
            powered_off: AtomicBool::new(false),
            timer: Timer::new(config.timer_period, config.seed),
            preempt: OnceLock::new(),
            capturing: AtomicBool::new(false),
            console: SegQueue::new(),
        })
    }

    /// Hardware parameters of this processor.
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Reads the clock.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// The timer device.
    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    /// Installs the routine run when a deferred yield is due.
    ///
    /// Returns false if a routine is already installed.
    pub fn set_preempt_handler(&self, f: impl Fn() + Send + Sync + 'static) -> bool {
        self.preempt.set(Box::new(f)).is_ok()
    }

    /// Returns true if interrupts are unmasked.
    pub fn interrupts_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Returns true while a timer interrupt is being handled.
    pub fn in_handler(&self) -> bool {
        self.in_handler.load(Ordering::SeqCst)
    }

    /// Masks interrupts and returns the previous state.
    pub fn disable_interrupts(&self) -> InterruptState {
        if self.enabled.swap(false, Ordering::SeqCst) {
            InterruptState::On
        } else {
            InterruptState::Off
        }
    }

    /// Restores a state returned by [`Cpu::disable_interrupts`].
    ///
    /// Going from masked to unmasked is where time passes: the clock advances
    /// by one kernel tick, a due timer interrupt is delivered, and a yield
    /// requested by the handler is carried out.
    pub fn restore_interrupts(&self, prior: InterruptState) {
        match prior {
            InterruptState::Off => self.enabled.store(false, Ordering::SeqCst),
            InterruptState::On => {
                if !self.enabled.swap(true, Ordering::SeqCst) && !self.is_powered_off() {
                    self.tick();
                }
            }
        }
    }

    fn tick(&self) {
        let now = self.clock.advance(self.config.kernel_tick);
        if self.timer.next_fire() <= now {
            self.deliver_interrupts(now);
        }
        self.preempt_if_requested();
    }

    fn deliver_interrupts(&self, now: u64) {
        struct HandlerScope<'a> {
            cpu: &'a Cpu,
            was_enabled: bool,
        }

        impl Drop for HandlerScope<'_> {
            fn drop(&mut self) {
                self.cpu.in_handler.store(false, Ordering::SeqCst);
                self.cpu.enabled.store(self.was_enabled, Ordering::SeqCst);
            }
        }

        let _scope = HandlerScope {
            cpu: self,
            was_enabled: self.enabled.swap(false, Ordering::SeqCst),
        };
        self.in_handler.store(true, Ordering::SeqCst);
        if self.timer.fire_if_due(now) {
            if let Some(handler) = self.timer.handler() {
                handler();
            }
        }
    }

    fn preempt_if_requested(&self) {
        if IN_PREEMPT.with(Cell::get) {
            return;
        }
        let Some(preempt) = self.preempt.get() else {
            self.yield_requested.store(false, Ordering::SeqCst);
            return;
        };
        IN_PREEMPT.with(|f| f.set(true));
        while self.yield_requested.swap(false, Ordering::SeqCst) && !self.is_powered_off() {
            preempt();
        }
        IN_PREEMPT.with(|f| f.set(false));
    }

    /// Asks for a yield once the running interrupt handler returns.
    pub fn request_yield(&self) {
        self.yield_requested.store(true, Ordering::SeqCst);
    }

    /// Waits for the next interrupt.
    ///
    /// The clock jumps to the next timer interrupt, which is delivered on the
    /// calling thread. Must be called with interrupts masked.
    pub fn idle(&self) {
        debug_assert!(!self.interrupts_enabled());
        let now = self.clock.advance_to(self.timer.next_fire());
        self.deliver_interrupts(now);
        // Nothing to preempt; the caller is picking the next thread anyway.
        self.yield_requested.store(false, Ordering::SeqCst);
    }

    /// Returns true once the clock reached the tick budget.
    pub fn budget_exhausted(&self) -> bool {
        self.config
            .tick_budget
            .is_some_and(|budget| self.now() >= budget)
    }

    /// Powers the processor off. Time stops and interrupts are never
    /// delivered again.
    pub fn power_off(&self) {
        self.powered_off.store(true, Ordering::SeqCst);
    }

    /// Returns true once the processor is powered off.
    pub fn is_powered_off(&self) -> bool {
        self.powered_off.load(Ordering::SeqCst)
    }

    /// Starts recording console lines instead of printing them.
    ///
    /// Returns false if the console is already hooked.
    pub fn hook_console(&self) -> bool {
        !self.capturing.swap(true, Ordering::SeqCst)
    }

    /// Stops recording and returns the recorded lines, oldest first.
    ///
    /// Returns `None` if the console was not hooked.
    pub fn finish_hook(&self) -> Option<Vec<String>> {
        if !self.capturing.swap(false, Ordering::SeqCst) {
            return None;
        }
        let mut lines = Vec::with_capacity(self.console.len());
        while let Some(line) = self.console.pop() {
            lines.push(line);
        }
        Some(lines)
    }

    /// Records `line` if the console is hooked.
    pub(crate) fn capture(&self, line: &str) -> bool {
        if self.capturing.load(Ordering::SeqCst) {
            self.console.push(line.to_owned());
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn config() -> MachineConfig {
        MachineConfig {
            timer_period: 100,
            kernel_tick: 10,
            seed: None,
            tick_budget: Some(1_000),
        }
    }

    #[test]
    fn timer_fires_on_unmask() {
        let cpu = Cpu::new(config());
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        cpu.timer().set_interrupt_handler(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        for _ in 0..25 {
            let prior = cpu.disable_interrupts();
            cpu.restore_interrupts(prior);
            cpu.restore_interrupts(InterruptState::On);
            let _ = cpu.disable_interrupts();
        }
        // 25 unmasks of 10 ticks each cross the 100-tick period twice.
        assert_eq!(cpu.now(), 250);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn idle_jumps_to_next_interrupt() {
        let cpu = Cpu::new(config());
        cpu.idle();
        assert_eq!(cpu.now(), 100);
        assert_eq!(cpu.timer().next_fire(), 200);
        assert!(!cpu.interrupts_enabled());
        assert!(!cpu.in_handler());
    }

    #[test]
    fn budget_is_reported() {
        let cpu = Cpu::new(config());
        while !cpu.budget_exhausted() {
            cpu.idle();
        }
        assert_eq!(cpu.now(), 1_000);
    }

    #[test]
    fn console_capture() {
        let cpu = Cpu::new(config());
        assert!(!cpu.capture("dropped"));
        assert!(cpu.hook_console());
        assert!(!cpu.hook_console());
        assert!(cpu.capture("first"));
        assert!(cpu.capture("second"));
        assert_eq!(
            cpu.finish_hook(),
            Some(vec!["first".to_string(), "second".to_string()])
        );
        assert_eq!(cpu.finish_hook(), None);
    }
}
