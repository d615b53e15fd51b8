// Kernel-side formatted output. `kprintln!` is the teacher's own
// `printf!`/`println!` pair, kept for the panic handler; structured
// diagnostics from the dispatcher (§4.1, §4.4-4.5) go through the
// `log` facade instead (SPEC_FULL.md §7A), matching `kernel`'s
// existing `log = "0.4.20"` dependency.

use core::fmt::{self, Write};

struct ConsoleWriter;

impl Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        crate::console::write_raw(s.as_bytes());
        Ok(())
    }
}

#[doc(hidden)]
pub fn _kprint(args: fmt::Arguments<'_>) {
    let _ = ConsoleWriter.write_fmt(args);
}

#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::printf::_kprint(core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kprintln {
    () => { $crate::kprint!("\n") };
    ($fmt:expr) => { $crate::kprint!(concat!($fmt, "\n")) };
    ($fmt:expr, $($arg:tt)*) => { $crate::kprint!(concat!($fmt, "\n"), $($arg)*) };
}

/// A minimal `log::Log` implementation that serializes through the
/// console writer. Installed once from `main::kmain`.
pub struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        kprintln!("[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

pub fn init() {
    // Safe to call more than once; log::set_logger only succeeds the
    // first time, and a kernel has exactly one logger for its lifetime.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Trace);
}
