// CPUTS handler (spec.md §4.3). Grounded directly on the original
// `do_cputs` in `kern/syscall.c`: copy at most `CPUTS_MAX` bytes from
// the user pointer in EBX, force a terminating nul, forward to the
// console, resume the caller. The console byte sink itself is
// `console::cputs` (spec.md §6 "Console contract").

use crate::console;
use crate::param::CPUTS_MAX;
use crate::proc::current;
use crate::x86::Trapframe;

use super::usercopy::{usercopy, Direction};

/// Copy the user's string into a kernel buffer and forward it to the
/// console. Resumes the caller normally whether or not the copy
/// succeeded -- a bad pointer reflects a fault via `usercopy` itself
/// (spec.md §8 scenario 2), at which point this function has nothing
/// left to do.
pub fn cputs(tf: &mut Trapframe, _cmd: u32) {
    let who = current();
    log::trace!("cputs: proc {} copying at most {} bytes from 0x{:x}", who, CPUTS_MAX, tf.regs.ebx);
    let mut buf = [0u8; CPUTS_MAX + 1];
    let uva = tf.regs.ebx as usize;

    if usercopy(tf, who, Direction::In, &mut buf[..CPUTS_MAX], uva).is_err() {
        return;
    }
    buf[CPUTS_MAX] = 0;
    console::cputs(&buf);
}
