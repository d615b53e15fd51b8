// System-call dispatch (spec.md §4.2, §6 "Syscall entry"). Grounded on
// the teacher's own `syscall/mod.rs` + `syscall/syscall.rs` split: a
// `mod.rs` that names the command surface and re-exports the per-type
// handlers, and a dispatcher function that reads a single register out
// of the current trapframe and routes to the right handler -- same
// shape as the teacher's `SYSCALL` table keyed on `tf.a7`, generalized
// from a flat syscall-number table to this subsystem's packed,
// orthogonal-bit command word (spec.md §4.2).

pub mod cmd;
mod cputs;
mod get;
mod put;
mod ret;
mod usercopy;

use crate::proc::ProcId;
use crate::x86::Trapframe;

pub use usercopy::Direction;

/// Sentinel meaning "this syscall did not complete: a fault was
/// reflected to the parent instead" (spec.md §4.6, §7). Modeled as
/// control flow propagated through `?` rather than a persisted error on
/// `Proc`, per SPEC_FULL.md §3's ambient note -- a reflected fault is
/// "the entire syscall did not happen" from the parent's observable
/// point of view, with the narrow exception of steps that already ran
/// before the fault (spec.md §7).
pub struct Reflected;

/// Overwrite `who`'s own trapframe with a synthesized hardware trap and
/// hand control to its parent, exactly as if `who`'s `INT` instruction
/// itself had raised `trapno`/`err` (spec.md §4.6). Shared by
/// `usercopy`'s fault path and by the PUT/GET handlers' own address/
/// MEMOP/SNAP validation failures.
pub fn reflect(tf: &mut Trapframe, who: ProcId, trapno: u32, err: u32) -> Reflected {
    log::warn!("proc {}: reflecting trap {} (err {})", who, trapno, err);
    tf.trapno = trapno;
    tf.err = err;
    crate::sched::proc_ret(who, tf, false);
    Reflected
}

/// Decode the command word out of `tf` and route to the matching
/// handler (spec.md §4.2, §6). Unknown type bits return silently,
/// leaving the trap for the outer (non-syscall) fault path to handle.
///
/// Per spec.md §4.7, a handler that blocks on `proc_wait` returns
/// `Ok(())` having done no further work; the caller is re-scheduled
/// once its child reaches STOP and re-enters this function from the
/// top, re-reading `tf.regs.eax`, so this function is idempotent up to
/// the point a handler actually waits.
pub fn syscall(tf: &mut Trapframe) {
    let cmd = tf.regs.eax;
    let ty = cmd::decode_type(cmd);
    log::trace!("syscall: cmd=0x{:08x} type={:?}", cmd, ty);
    match ty {
        Some(cmd::SyscallType::Cputs) => cputs::cputs(tf, cmd),
        Some(cmd::SyscallType::Put) => {
            let _ = put::put(tf, cmd);
        }
        Some(cmd::SyscallType::Get) => {
            let _ = get::get(tf, cmd);
        }
        Some(cmd::SyscallType::Ret) => ret::ret(tf),
        None => {} // not one of ours; the outer trap dispatcher handles it
    }
}

#[cfg(test)]
pub(crate) use cputs::cputs;
#[cfg(test)]
pub(crate) use get::get;
#[cfg(test)]
pub(crate) use put::put;
#[cfg(test)]
pub(crate) use ret::ret;
