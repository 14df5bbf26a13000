//! Kernel print utilities.
//!
//! Besides the `print!`/`println!` macros, this module provides the machine's
//! [`log::Log`] implementation. A log record becomes one `[LEVEL] message`
//! line. If the processor's console is hooked (see [`Cpu::hook_console`]) the
//! line is recorded there, otherwise it is printed unless [`QUIET`] is set.
//!
//! [`Cpu::hook_console`]: crate::Cpu::hook_console
use crate::{QUIET, cpu};
use core::{str::FromStr, sync::atomic::Ordering};
use log::LevelFilter;

#[doc(hidden)]
pub fn _print(fmt: core::fmt::Arguments<'_>) {
    std::print!("{fmt}");
}

/// Prints out the message.
///
/// Use the format! syntax to write data to the standard output.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::kprint::_print(format_args!($($arg)*)));
}

/// Prints out the message with a newline.
///
/// Use the format! syntax to write data to the standard output.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!("[{}] {}", record.level(), record.args());
        if cpu::current().is_some_and(|cpu| cpu.capture(&line)) {
            return;
        }
        if !QUIET.load(Ordering::SeqCst) {
            println!("{line}");
        }
    }

    fn flush(&self) {}
}

static LOGGER: Logger = Logger;

/// Installs the console as the `log` backend.
///
/// Calling it more than once is harmless.
pub fn init() {
    let _ = log::set_logger(&LOGGER);
}

/// Sets the log level from a level name such as `"debug"`.
///
/// Unknown or missing names select `Info`.
pub fn set_log_level(env: Option<&str>) {
    log::set_max_level(
        env.and_then(|s| LevelFilter::from_str(s).ok())
            .unwrap_or(LevelFilter::Info),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cpu, MachineConfig};

    #[test]
    fn records_are_captured_when_hooked() {
        init();
        set_log_level(Some("info"));
        let cpu = Cpu::new(MachineConfig::default());
        cpu::enter(cpu.clone());

        assert!(cpu.hook_console());
        log::info!("water made: {}", 1);
        log::debug!("filtered out");
        assert_eq!(cpu.finish_hook(), Some(vec!["[INFO] water made: 1".into()]));
    }
}
