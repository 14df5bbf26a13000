//! # tickos: a tick-driven educational kernel
//!
//! tickos is a small kernel for a simulated single-processor machine. It
//! provides kernel threads, a pluggable scheduler, a timer interrupt and a
//! blocking [`Lock`](sync::Lock), which is just enough to build and study
//! thread coordination primitives such as alarms, condition variables and
//! rendezvous points.
//!
//! ## The machine
//!
//! The machine (see the `abyss` crate) has one processor, a virtual clock and
//! a periodic timer. Time is measured in ticks:
//!
//! - every time a thread unmasks interrupts, one *kernel tick* passes,
//! - when no thread is runnable the processor idles until the next timer
//!   interrupt,
//! - every *timer period* ticks the timer interrupt fires.
//!
//! Masking interrupts is therefore the kernel's only atomicity primitive:
//! while interrupts are masked, neither the timer handler nor another thread
//! can run.
//!
//! ## Booting
//!
//! [`boot`] powers on a fresh machine, runs the given closure as its first
//! thread, and powers the machine off when that thread exits. The exit code of
//! the first thread is the result of the boot:
//!
//! ```rust
//! use tickos::{SystemConfigurationBuilder, boot, thread::ThreadBuilder};
//!
//! let config = SystemConfigurationBuilder::new().timer_period(100).build();
//! let code = boot(&config, || {
//!     let child = ThreadBuilder::new("child").spawn(|| ());
//!     assert_eq!(child.join(), 0);
//! });
//! assert_eq!(code, Ok(0));
//! ```
//!
//! ### Selectively run tests
//!
//! Graders register their test cases with [`TestDriver::start`]. You can run
//! one or more specific test cases by passing their names as arguments to the
//! test runner:
//!
//! ```bash
//! $ cargo run -- alarm::wake_order rendezvous::single_pair
//! ```
//!
//! ### Configuration from the environment
//!
//! [`SystemConfigurationBuilder::from_env`] reads:
//!
//! | Variable              | Meaning                                  |
//! |-----------------------|------------------------------------------|
//! | `TICKOS_TIMER_PERIOD` | ticks between timer interrupts           |
//! | `TICKOS_SEED`         | seed of the timer jitter                 |
//! | `TICKOS_TICK_BUDGET`  | ticks before a stuck machine is halted   |
//! | `TICKOS_LOG`          | log level (`error` ... `trace`)          |
#![deny(missing_docs, rustdoc::broken_intra_doc_links)]

mod interrupt;

pub mod sync;
pub mod thread;

pub use abyss::{
    MachineConfig, clock,
    interrupt::{InterruptGuard, InterruptState},
    print, println,
};
pub use interrupt::claim_timer;

use abyss::Cpu;
use core::sync::atomic::Ordering;
use crossbeam_utils::sync::Parker;
use std::{collections::BTreeSet, sync::Arc};
use thread::{
    Kernel,
    scheduler::{Fifo, Scheduler},
};

/// Errors of the kernel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KernelError {
    /// Invalid argument. (EINVAL)
    InvalidArgument,
    /// Device or resource busy. (EBUSY)
    Busy,
    /// The machine ran out of its tick budget. (ETIME)
    TickBudgetExhausted,
}

impl core::fmt::Display for KernelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KernelError::InvalidArgument => write!(f, "invalid argument"),
            KernelError::Busy => write!(f, "device or resource busy"),
            KernelError::TickBudgetExhausted => write!(f, "tick budget exhausted"),
        }
    }
}

type SchedulerFactory = Arc<dyn Fn() -> Box<dyn Scheduler> + Send + Sync>;

/// Settings of a machine, consumed by [`boot`].
///
/// A configuration can boot any number of machines.
#[derive(Clone)]
pub struct SystemConfiguration {
    machine: MachineConfig,
    scheduler: SchedulerFactory,
    log_level: Option<String>,
    quiet: bool,
}

impl Default for SystemConfiguration {
    fn default() -> Self {
        SystemConfigurationBuilder::new().build()
    }
}

/// A builder for system configuration settings.
///
/// The [`SystemConfigurationBuilder`] struct provides an interface for
/// configuring system-wide settings before boot, such as the scheduling
/// policy and the timer of the machine.
pub struct SystemConfigurationBuilder {
    config: SystemConfiguration,
}

impl Default for SystemConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemConfigurationBuilder {
    /// Starts from the default machine: a strictly periodic timer firing
    /// every 500 ticks, 10 ticks per kernel tick, a FIFO scheduler.
    pub fn new() -> Self {
        Self {
            config: SystemConfiguration {
                machine: MachineConfig::default(),
                scheduler: Arc::new(|| Box::new(Fifo::new())),
                log_level: None,
                quiet: false,
            },
        }
    }

    /// Starts from the default machine, overridden by the `TICKOS_*`
    /// environment variables. Malformed values are ignored.
    pub fn from_env() -> Self {
        fn var<T: core::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok()?.trim().parse().ok()
        }

        let mut builder = Self::new();
        if let Some(period) = var("TICKOS_TIMER_PERIOD") {
            builder = builder.timer_period(period);
        }
        if let Some(seed) = var("TICKOS_SEED") {
            builder = builder.randomize_timer(seed);
        }
        if let Some(budget) = var("TICKOS_TICK_BUDGET") {
            builder = builder.tick_budget(Some(budget));
        }
        if let Some(level) = var::<String>("TICKOS_LOG") {
            builder = builder.log_level(&level);
        }
        builder
    }

    /// Sets the system-wide scheduler.
    ///
    /// Every booted machine gets its own scheduler built by `scheduler`.
    pub fn set_scheduler<S: Scheduler + 'static>(
        mut self,
        scheduler: impl Fn() -> S + Send + Sync + 'static,
    ) -> Self {
        self.config.scheduler = Arc::new(move || Box::new(scheduler()));
        self
    }

    /// Sets the ticks between two timer interrupts.
    pub fn timer_period(mut self, ticks: u64) -> Self {
        self.config.machine.timer_period = ticks;
        self
    }

    /// Sets the ticks consumed whenever interrupts are re-enabled.
    pub fn kernel_tick(mut self, ticks: u64) -> Self {
        self.config.machine.kernel_tick = ticks;
        self
    }

    /// Draws each timer interval uniformly from `1..=2 * period`, seeded by
    /// `seed`.
    pub fn randomize_timer(mut self, seed: u64) -> Self {
        self.config.machine.seed = Some(seed);
        self
    }

    /// Sets the tick at which a machine that did not finish is halted.
    /// `None` lets it run forever.
    pub fn tick_budget(mut self, ticks: Option<u64>) -> Self {
        self.config.machine.tick_budget = ticks;
        self
    }

    /// Sets the log level, such as `"info"` or `"debug"`.
    pub fn log_level(mut self, level: &str) -> Self {
        self.config.log_level = Some(level.to_owned());
        self
    }

    /// Suppresses the console output of log records.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.config.quiet = quiet;
        self
    }

    /// Finishes the configuration.
    pub fn build(self) -> SystemConfiguration {
        self.config
    }
}

/// Boots a machine configured by `config` and runs `main` as its first thread.
///
/// Returns the exit code of `main` once it exits; a panic is reported as
/// `-1`. Threads that are still alive at that moment are never resumed.
///
/// # Errors
/// - [`KernelError::InvalidArgument`] if the timer period or the kernel tick
///   is zero.
/// - [`KernelError::TickBudgetExhausted`] if the clock reaches the tick budget
///   before `main` exits.
pub fn boot<F>(config: &SystemConfiguration, main: F) -> Result<i32, KernelError>
where
    F: FnOnce() + Send + 'static,
{
    let machine = config.machine;
    if machine.timer_period == 0 || machine.kernel_tick == 0 {
        return Err(KernelError::InvalidArgument);
    }
    abyss::kprint::init();
    abyss::kprint::set_log_level(config.log_level.as_deref());
    abyss::QUIET.store(config.quiet, Ordering::SeqCst);

    let parker = Parker::new();
    let kernel = Kernel::new(
        Cpu::new(machine),
        (config.scheduler)(),
        parker.unparker().clone(),
    );
    interrupt::install(&kernel);
    let main = thread::spawn_on(&kernel, String::from("main"), main);
    kernel.set_boot_thread(main.tid);
    log::debug!(
        "Boot: timer period {}, kernel tick {}, jitter seed {:?}.",
        machine.timer_period,
        machine.kernel_tick,
        machine.seed
    );
    kernel.start();

    loop {
        if let Some(result) = kernel.halt_result() {
            return result;
        }
        parker.park();
    }
}

/// Hardware parameters of the machine the current thread runs on.
pub fn machine() -> MachineConfig {
    *thread::kernel().cpu.config()
}

// Test utilities
#[doc(hidden)]
pub trait TestCase
where
    Self: Sync + Send,
{
    fn name(&'static self) -> &'static str;
    fn run(&'static self, config: &SystemConfiguration) -> bool;
}

impl<T> TestCase for T
where
    T: Fn() + Send + Sync + 'static,
{
    fn name(&'static self) -> &'static str {
        core::any::type_name::<T>()
    }
    fn run(&'static self, config: &SystemConfiguration) -> bool {
        print!("test {} ... ", core::any::type_name::<T>());
        match boot(config, move || self()) {
            Ok(0) => {
                println!("ok");
                true
            }
            Ok(code) => {
                println!("FAILED (exit code {code})");
                false
            }
            Err(e) => {
                println!("FAILED ({e})");
                false
            }
        }
    }
}

/// A driver for running tests.
pub struct TestDriver {
    _p: (),
}

impl TestDriver {
    /// Run the given tests, each on a freshly booted machine.
    ///
    /// Test names given on the command line select a subset of `tests`.
    /// Returns true if every selected test passed.
    pub fn start<const TC: usize>(
        config: &SystemConfiguration,
        tests: [&'static dyn TestCase; TC],
    ) -> bool {
        let filter = std::env::args().skip(1).collect::<BTreeSet<_>>();
        let tests = tests
            .iter()
            .filter(|test| {
                if filter.is_empty() {
                    return true;
                }
                let name = test.name();
                let r = name.split("::").next().map(|n| n.len() + 2).unwrap_or(0);
                filter.contains(name.get(r..).unwrap_or(name))
            })
            .collect::<Vec<_>>();
        let (total, mut succ) = (tests.len(), 0);
        println!(
            "Running {} test{}",
            total,
            if total == 1 { "" } else { "s" }
        );

        for test in tests {
            if test.run(config) {
                succ += 1;
            }
        }
        println!(
            "test result: {}. {} passed; {} failed",
            if total == succ { "ok" } else { "FAILED" },
            succ,
            total - succ
        );
        total == succ
    }
}

#[cfg(test)]
mod tests;
