//! # Synchronization Primitives.
//!
//! The kernel provides two synchronization primitives: the [`SpinLock`],
//! which masks interrupts while held, and the blocking [`Lock`]. A lock alone
//! cannot express "wait until the buffer is non-empty": a thread would have to
//! release the lock, sleep, and reacquire the lock, and a wakeup sent between
//! the release and the sleep would be lost.
//!
//! The [`ConditionVariable`] closes that window. Its `sleep` releases the lock
//! and blocks the thread as one atomic step.
//!
//! | Primitive             | Blocks Thread? | Fair?    | Typical Use Case                         |
//! |-----------------------|----------------|----------|------------------------------------------|
//! | [`SpinLock`]          | No             | No       | Short critical sections, handler state   |
//! | [`Lock`]              | Yes            | Yes      | Exclusive access to shared data          |
//! | [`ConditionVariable`] | Yes            | Yes      | Waiting for a condition to become true   |
//!
//! [`SpinLock`]: tickos::sync::SpinLock
//! [`Lock`]: tickos::sync::Lock
//! [`ConditionVariable`]: crate::sync::condition_variable::ConditionVariable

pub mod condition_variable;

pub use condition_variable::*;
