//! # Lock.
//!
//! A [`Lock`] gives mutual exclusion between threads. Unlike [`SpinLock`], a
//! thread that finds the lock taken goes to sleep with
//! [`Current::park_with`] and is woken by the releasing thread.
//!
//! The lock has an owner. Only the owner may release it, and the owner can be
//! queried with [`Lock::is_held_by_current_thread`], which is how monitors
//! built on top of it check their callers. Ownership is handed directly to the
//! first waiter on release, so waiters acquire the lock in arrival order.
//!
//! [`SpinLock`]: super::SpinLock
use crate::thread::{Current, ParkHandle};
use abyss::{interrupt::InterruptGuard, spinlock::SpinLock};
use std::collections::VecDeque;

struct LockInner {
    holder: Option<u64>,
    waiters: VecDeque<ParkHandle>,
}

/// A blocking mutual exclusion lock.
pub struct Lock {
    inner: SpinLock<LockInner>,
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock {
    /// Creates a new lock in an unlocked state.
    pub const fn new() -> Self {
        Self {
            inner: SpinLock::new(LockInner {
                holder: None,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Acquires the lock, sleeping until it is available.
    ///
    /// # Panics
    /// Panics if the current thread already holds the lock.
    #[track_caller]
    pub fn acquire(&self) {
        let tid = Current::get_tid();
        let _guard = InterruptGuard::new();
        let mut inner = self.inner.lock();
        let holder = inner.holder;
        match holder {
            None => {
                inner.holder = Some(tid);
                inner.unlock();
            }
            Some(holder) if holder == tid => {
                inner.unlock();
                panic!("Lock::acquire: the lock is already held by thread {tid}.");
            }
            Some(_) => {
                // The releasing thread makes us the holder before waking us.
                Current::park_with(move |handle| {
                    inner.waiters.push_back(handle);
                    inner.unlock();
                });
                debug_assert!(self.is_held_by_current_thread());
            }
        }
    }

    /// Releases the lock, handing it to the longest waiting thread if any.
    ///
    /// # Panics
    /// Panics if the current thread does not hold the lock.
    #[track_caller]
    pub fn release(&self) {
        let tid = Current::get_tid();
        let _guard = InterruptGuard::new();
        let mut inner = self.inner.lock();
        if inner.holder != Some(tid) {
            inner.unlock();
            panic!("Lock::release: the lock is not held by thread {tid}.");
        }
        let next = inner.waiters.pop_front();
        inner.holder = next.as_ref().map(ParkHandle::tid);
        inner.unlock();
        if let Some(next) = next {
            next.unpark();
        }
    }

    /// Returns true if the current thread holds the lock.
    pub fn is_held_by_current_thread(&self) -> bool {
        let tid = Current::get_tid();
        let inner = self.inner.lock();
        let held = inner.holder == Some(tid);
        inner.unlock();
        held
    }
}
