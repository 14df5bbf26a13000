//! # Condition Variable.
//!
//! A **Condition Variable** allows a thread to efficiently block until a
//! certain condition is met, without consuming CPU cycles. It is always used
//! in conjunction with a [`Lock`] that guards access to shared data.
//!
//! The condition variable is bound to its lock at construction, and every
//! operation checks that the caller holds it. Calling [`sleep`], [`wake`] or
//! [`wake_all`] without the lock is a bug and kills the calling thread.
//!
//! Waiters are woken in the order they went to sleep. A woken thread does not
//! get the lock handed over: it competes for it again like any other thread,
//! so callers re-check their condition in a loop:
//!
//! ```rust,ignore
//! lock.acquire();
//! while buffer.is_empty() {
//!     not_empty.sleep();
//! }
//! let item = buffer.pop();
//! lock.release();
//! ```
//!
//! [`sleep`]: ConditionVariable::sleep
//! [`wake`]: ConditionVariable::wake
//! [`wake_all`]: ConditionVariable::wake_all

use std::{collections::VecDeque, sync::Arc};
use tickos::{
    InterruptState,
    sync::{Lock, SpinLock},
    thread::{Current, ParkHandle},
};

/// A Condition Variable
///
/// Condition variables represent the ability to block a thread such that it
/// consumes no CPU time while waiting for an event to occur.
pub struct ConditionVariable {
    lock: Arc<Lock>,
    waiters: SpinLock<VecDeque<ParkHandle>>,
}

impl ConditionVariable {
    /// Creates a new condition variable associated with `lock`.
    pub fn new(lock: Arc<Lock>) -> Self {
        Self {
            lock,
            waiters: SpinLock::new(VecDeque::new()),
        }
    }

    #[track_caller]
    fn assert_lock_held(&self, op: &str) {
        assert!(
            self.lock.is_held_by_current_thread(),
            "ConditionVariable::{op}: the associated lock is not held by the current thread."
        );
    }

    /// Atomically releases the lock and blocks the current thread until it is
    /// woken, then reacquires the lock before returning.
    ///
    /// # Panics
    /// Panics if the current thread does not hold the associated lock.
    #[track_caller]
    pub fn sleep(&self) {
        self.assert_lock_held("sleep");

        let prior = InterruptState::disable();
        self.lock.release();
        let mut waiters = self.waiters.lock();
        Current::park_with(move |handle| {
            waiters.push_back(handle);
            waiters.unlock();
        });
        self.lock.acquire();
        prior.restore();
    }

    /// Wakes up the longest waiting thread, if any.
    ///
    /// # Panics
    /// Panics if the current thread does not hold the associated lock.
    #[track_caller]
    pub fn wake(&self) {
        self.assert_lock_held("wake");
        if let Some(handle) = self.pop_waiter() {
            handle.unpark();
        }
    }

    /// Wakes up all waiting threads, in the order they went to sleep.
    ///
    /// # Panics
    /// Panics if the current thread does not hold the associated lock.
    #[track_caller]
    pub fn wake_all(&self) {
        self.assert_lock_held("wake_all");
        while let Some(handle) = self.pop_waiter() {
            handle.unpark();
        }
    }

    /// Number of threads sleeping on this condition variable.
    pub fn num_waiters(&self) -> usize {
        let waiters = self.waiters.lock();
        let len = waiters.len();
        waiters.unlock();
        len
    }

    fn pop_waiter(&self) -> Option<ParkHandle> {
        let mut waiters = self.waiters.lock();
        let handle = waiters.pop_front();
        waiters.unlock();
        handle
    }
}
