//! Thread scheduler

use super::{Kernel, Thread, ThreadState, wait_for_cpu};
use crate::KernelError;
use abyss::{interrupt::InterruptGuard, spinlock::SpinLock};
use std::{collections::VecDeque, sync::Arc};

/// A trait for a thread scheduler.
///
/// The [`Scheduler`] trait defines the common functionality expected from a
/// thread scheduler. It provides an interface for managing threads, determining
/// which thread to run next, and handling periodic timer interrupts.
///
/// The kernel calls every method with interrupts masked, so an implementation
/// never races with the timer handler.
pub trait Scheduler: Send + Sync {
    /// Peek a next thread to run.
    ///
    /// This method checks the queue and returns the next thread to run. If no
    /// threads are available, it returns `None`.
    fn next_to_run(&self) -> Option<Arc<Thread>>;

    /// Push a thread `th` into scheduling queue.
    ///
    /// This method adds the specified thread to the queue of threads waiting to
    /// be scheduled.
    fn push_to_queue(&self, th: Arc<Thread>);

    /// Called on every timer interrupt, before the timer handler runs.
    fn timer_tick(&self);
}

/// A First-in-first-out scheduler.
#[derive(Default)]
pub struct Fifo {
    runqueue: SpinLock<VecDeque<Arc<Thread>>>,
}

impl Fifo {
    /// Creates an empty FIFO scheduler.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for Fifo {
    fn next_to_run(&self) -> Option<Arc<Thread>> {
        let mut guard = self.runqueue.lock();
        let val = guard.pop_front();
        guard.unlock();
        val
    }
    fn push_to_queue(&self, th: Arc<Thread>) {
        let mut guard = self.runqueue.lock();
        guard.push_back(th);
        guard.unlock();
    }
    fn timer_tick(&self) {}
}

/// Hands the processor from `prev` to the next runnable thread.
///
/// `prev` must already be queued, parked or exited. The call returns when
/// `prev` is scheduled again; for an exited thread it returns right away so
/// that its host thread can finish.
pub(crate) fn reschedule(kernel: &Kernel, prev: &Arc<Thread>) {
    assert!(
        InterruptGuard::is_guarded(),
        "Try to reschedule a thread with interrupts enabled."
    );

    let next = loop {
        if kernel.cpu.is_powered_off() {
            if matches!(prev.state(), ThreadState::Exited(_)) {
                return;
            }
            super::unwind_halted();
        }
        if kernel.cpu.budget_exhausted() {
            log::warn!("Tick budget exhausted at tick {}.", kernel.cpu.now());
            kernel.halt(Err(KernelError::TickBudgetExhausted));
            continue;
        }
        match kernel.scheduler.next_to_run() {
            Some(th) => break th,
            None => kernel.cpu.idle(),
        }
    };

    next.set_state(ThreadState::Running);
    if Arc::ptr_eq(&next, prev) {
        return;
    }

    let prev_exited = matches!(prev.state(), ThreadState::Exited(_));
    kernel.switch_to(&next);
    if !prev_exited {
        wait_for_cpu(kernel, prev);
    }
}
