//! # Timed wait queue.
//!
//! A [`TimedWaitQueue`] lets a thread sleep until at least a given number of
//! ticks has passed. Sleeping threads are kept in a min-heap keyed by their
//! absolute wake tick; on every timer interrupt the handler pops and unparks
//! every thread whose wake tick has been reached.
//!
//! The queue is shared between threads and the timer handler. A blocking
//! lock cannot be used from an interrupt handler, so every access is made
//! atomic by masking interrupts instead.
//!
//! After releasing the sleepers, the handler yields the interrupted thread.
//! The yield takes effect once the handler returns, which is how the timer
//! preempts threads.
//!
//! The queue owns the machine's timer interrupt: [`TimedWaitQueue::install`]
//! succeeds at most once per machine.
use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, binary_heap::PeekMut},
    sync::Arc,
};
use tickos::{
    InterruptGuard, KernelError, claim_timer, clock,
    sync::SpinLock,
    thread::{Current, ParkHandle},
};

/// A sleeping thread and the tick it may wake at.
struct WakeEntry {
    wake: u64,
    handle: ParkHandle,
}

impl PartialEq for WakeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.wake == other.wake
    }
}

impl Eq for WakeEntry {}

impl PartialOrd for WakeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WakeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.wake.cmp(&other.wake)
    }
}

/// A queue of threads sleeping until a tick.
pub struct TimedWaitQueue {
    sleepers: SpinLock<BinaryHeap<Reverse<WakeEntry>>>,
}

impl TimedWaitQueue {
    /// Creates a queue and installs it as the timer handler of the current
    /// machine.
    ///
    /// # Errors
    /// [`KernelError::Busy`] if the timer interrupt is already claimed, for
    /// instance by another `TimedWaitQueue`.
    pub fn install() -> Result<Arc<Self>, KernelError> {
        let queue = Arc::new(Self {
            sleepers: SpinLock::new(BinaryHeap::new()),
        });
        let handler = queue.clone();
        claim_timer(move || handler.on_timer_tick())?;
        Ok(queue)
    }

    /// Puts the current thread to sleep for at least `min_ticks` ticks.
    ///
    /// The thread is woken on the first timer interrupt at or after the
    /// deadline. A zero or negative wait still sleeps until the next timer
    /// interrupt.
    pub fn wait_until(&self, min_ticks: i64) {
        let _guard = InterruptGuard::new();
        let wake = clock::now().saturating_add_signed(min_ticks);
        let mut sleepers = self.sleepers.lock();
        Current::park_with(move |handle| {
            sleepers.push(Reverse(WakeEntry { wake, handle }));
            sleepers.unlock();
        });
    }

    /// The timer interrupt handler.
    ///
    /// Unparks every thread whose wake tick is not after the current tick, then
    /// yields the current thread.
    pub fn on_timer_tick(&self) {
        let now = clock::now();
        let guard = InterruptGuard::new();
        let mut sleepers = self.sleepers.lock();
        while let Some(entry) = sleepers.peek_mut() {
            if entry.0.wake > now {
                break;
            }
            PeekMut::pop(entry).0.handle.unpark();
        }
        sleepers.unlock();
        drop(guard);

        Current::yield_now();
    }

    /// Waits for at least `min_ticks` ticks by yielding in a loop.
    ///
    /// The queue is left untouched. This is the busy-waiting baseline that
    /// [`TimedWaitQueue::wait_until`] improves upon.
    pub fn wait_until_busy(&self, min_ticks: i64) {
        let wake = clock::now().saturating_add_signed(min_ticks);
        while clock::now() < wake {
            Current::yield_now();
        }
    }

    /// Number of sleeping threads.
    pub fn num_sleepers(&self) -> usize {
        let sleepers = self.sleepers.lock();
        let len = sleepers.len();
        sleepers.unlock();
        len
    }
}
