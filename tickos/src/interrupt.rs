//! Interrupt management.
//!
//! The machine has a single interrupt source, the timer. On every timer
//! interrupt the kernel first notifies the scheduler, then runs the timer
//! handler claimed with [`claim_timer`]. Without a claimed handler, the
//! current thread simply yields, which is the kernel's time slicing.
use crate::{
    KernelError,
    thread::{Current, Kernel, kernel},
};
use std::sync::Arc;

pub(crate) type TimerHandler = Arc<dyn Fn() + Send + Sync>;

/// Wires the machine's timer and deferred yields to the kernel.
pub(crate) fn install(kernel: &Arc<Kernel>) {
    let weak = Arc::downgrade(kernel);
    kernel
        .cpu
        .timer()
        .set_interrupt_handler(Some(Arc::new(move || {
            if let Some(kernel) = weak.upgrade() {
                do_handle_timer(&kernel);
            }
        })));
    kernel.cpu.set_preempt_handler(Current::yield_now);
}

fn do_handle_timer(kernel: &Kernel) {
    kernel.scheduler.timer_tick();

    let guard = kernel.timer_handler.lock();
    let handler = guard.clone();
    guard.unlock();

    match &handler {
        Some(handler) => handler(),
        _ => Current::yield_now(),
    }
}

/// Claims the timer interrupt of the current machine for `handler`.
///
/// The handler runs with interrupts masked on every timer interrupt. A
/// thread may call [`Current::yield_now`] from it; the yield happens once
/// the handler returns.
///
/// # Errors
/// [`KernelError::Busy`] if another handler already claimed the timer.
pub fn claim_timer(handler: impl Fn() + Send + Sync + 'static) -> Result<(), KernelError> {
    let kernel = kernel();
    let mut guard = kernel.timer_handler.lock();
    if guard.is_some() {
        guard.unlock();
        return Err(KernelError::Busy);
    }
    *guard = Some(Arc::new(handler));
    guard.unlock();
    Ok(())
}
