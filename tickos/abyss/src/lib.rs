//! The abyss of the kernel: the machine that tickos runs on.
//!
//! This crate simulates a single processor with the few pieces of hardware a
//! cooperative kernel needs:
//!
//! - a virtual [`clock`] counting ticks,
//! - an [`interrupt`] controller whose only operation is masking and
//!   restoring the interrupt flag,
//! - a periodic [`timer`] device,
//! - a console ([`kprint`]) that also backs the `log` facade.
//!
//! A processor is driven by host threads, but exactly one of them holds the
//! processor at any instant. Every host thread that acts as a kernel thread
//! enters the processor with [`cpu::enter`] and finds it again through
//! [`cpu::current`].
//!
//! Virtual time only moves when the interrupt flag goes from masked to
//! unmasked (one kernel tick per transition) or when the processor idles
//! (the clock jumps to the next timer interrupt). Therefore a thread that masks
//! interrupts is guaranteed that no timer handler interleaves with it.
//!
//! You are **not** supposed to use this crate directly to implement
//! synchronization primitives. See the [`tickos`] crate for the kernel
//! interface.
//!
//! [`tickos`]: ../tickos/index.html
#![deny(missing_docs)]

use core::sync::atomic::AtomicBool;

pub extern crate log;

#[macro_use]
pub mod kprint;
pub mod clock;
pub mod cpu;
pub mod interrupt;
pub mod spinlock;
pub mod timer;

pub use cpu::{Cpu, MachineConfig};

/// Suppresses console output of log records.
///
/// Captured output (see [`Cpu::hook_console`]) is still recorded.
pub static QUIET: AtomicBool = AtomicBool::new(false);
