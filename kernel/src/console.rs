// The console byte sink (spec.md §6, "Console contract"). Out of
// scope as a line-discipline device — this crate only needs the
// write side CPUTS forwards to — so this is a thin trait plus two
// implementations: a real one that would drive a UART, and a
// test-mode one that records bytes for assertions, grounded on the
// structure of the teacher's own `console.rs`/`printf.rs` split.

use crate::spinlock::Spinlock;

pub trait ConsoleSink: Send {
    fn putc(&mut self, c: u8);
}

pub struct Uart0;

impl ConsoleSink for Uart0 {
    fn putc(&mut self, c: u8) {
        const UART0_TX: *mut u8 = 0x3f8 as *mut u8;
        unsafe { UART0_TX.write_volatile(c) };
    }
}

static mut CONSOLE_LOCK: Spinlock = Spinlock::init_lock("cons");

#[cfg(not(test))]
static mut CONSOLE_INSTANCE: Uart0 = Uart0;

/// Write a nul-terminated byte string to the console, locked.
/// `do_cputs` (syscall::cputs) is the only caller in the dispatcher.
#[cfg(not(test))]
pub fn cputs(bytes: &[u8]) {
    unsafe {
        CONSOLE_LOCK.acquire();
        for &b in bytes {
            if b == 0 {
                break;
            }
            CONSOLE_INSTANCE.putc(b);
        }
        CONSOLE_LOCK.release();
    }
}

#[cfg(test)]
pub fn cputs(bytes: &[u8]) {
    unsafe {
        CONSOLE_LOCK.acquire();
    }
    crate::testsupport::test_console_write(bytes);
    unsafe {
        CONSOLE_LOCK.release();
    }
}

/// Write raw bytes to the console without nul-truncation, used by the
/// logger and the panic handler rather than the CPUTS syscall path.
#[cfg(not(test))]
pub fn write_raw(bytes: &[u8]) {
    unsafe {
        CONSOLE_LOCK.acquire();
        for &b in bytes {
            CONSOLE_INSTANCE.putc(b);
        }
        CONSOLE_LOCK.release();
    }
}

#[cfg(test)]
pub fn write_raw(bytes: &[u8]) {
    unsafe {
        CONSOLE_LOCK.acquire();
    }
    crate::testsupport::test_console_write(bytes);
    unsafe {
        CONSOLE_LOCK.release();
    }
}
