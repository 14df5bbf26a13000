//! Synchronization primitives provided by the kernel.
//!
//! - [`SpinLock`]: masks interrupts while held. Suitable for short critical
//!   sections that never block.
//! - [`Lock`]: a blocking mutual exclusion lock with an owner. Waiters sleep
//!   instead of spinning.
//!
//! Higher level primitives are built on top of these two.
pub mod lock;

pub use abyss::spinlock::{SpinLock, SpinLockGuard, WouldBlock};
pub use lock::Lock;
