//! # Threads: coordination primitives on a uniprocessor
//!
//! This crate builds four thread coordination primitives on top of the tickos
//! kernel. The kernel offers little: threads can park themselves and be
//! unparked through a [`ParkHandle`], interrupts can be masked, and a
//! blocking [`Lock`] is available. Every primitive here must guarantee that no
//! wakeup is lost and no thread is woken twice, even though "check the
//! condition" and "go to sleep" are two separate steps. Masking interrupts is
//! what makes them one.
//!
//! ## Project Outline
//!
//! - [`TimedWaitQueue`]: put a thread to sleep for at least a number of ticks,
//!   driven by the timer interrupt.
//! - [`ConditionVariable`]: monitor-style wait and signal over a caller
//!   supplied [`Lock`].
//! - [`Rendezvous`]: pairs one speaker with one listener and hands over
//!   exactly one value per pair.
//! - [`TernaryReaction`]: fires one reaction per assembled group of two A
//!   participants and one B participant.
//!
//! ## Implementation Orders
//! 1. [`timed_wait_queue`]
//! 2. [`sync::condition_variable`]
//! 3. [`rendezvous`]
//! 4. [`reaction`]
//!
//! [`ParkHandle`]: tickos::thread::ParkHandle
//! [`Lock`]: tickos::sync::Lock
//! [`TimedWaitQueue`]: timed_wait_queue::TimedWaitQueue
//! [`ConditionVariable`]: sync::condition_variable::ConditionVariable
//! [`Rendezvous`]: rendezvous::Rendezvous
//! [`TernaryReaction`]: reaction::TernaryReaction
#![deny(rustdoc::broken_intra_doc_links)]

pub mod reaction;
pub mod rendezvous;
pub mod sync;
pub mod timed_wait_queue;

pub use reaction::TernaryReaction;
pub use rendezvous::Rendezvous;
pub use sync::ConditionVariable;
pub use timed_wait_queue::TimedWaitQueue;
