// Safe user/kernel copy (spec.md §4.1), the one primitive in this
// dispatcher that crosses the trust boundary. Grounded on the
// teacher's `vm::copyin`/`copyout` for the validate-then-move shape,
// but the underlying move is page-at-a-time through `pmap::AddrSpace`
// rather than a `memmove` against a kernel alias of the mapping, since
// this crate models the address space as data rather than a hardware
// page table a kernel VA can walk directly.
//
// Fault recovery: the original installs a per-CPU recovery *pointer*
// consulted by the trap-entry assembly if a page fault lands mid-copy
// (spec.md §9, "Non-local unwind from a fault during a kernel copy").
// This crate has no real MMU raising faults from Rust code, so the
// equivalent unsafety is "the address range isn't actually backed by a
// mapped page" -- `AddrSpace::copy_out_bytes`/`copy_in_bytes` report
// that as `Err(KernelError::BadAddress)` instead of faulting
// asynchronously. `RecoveryGuard` is still installed around the move
// so the per-CPU invariant (`usercopy` never returns with it still
// set) and the "no lock held across usercopy" precondition are both
// exercised exactly as spec.md §4.1/§8 require, even though in this
// port the "recovery" path and the "bad address" path are the same
// code path rather than a fault handler jumping back in.

use crate::pmap;
use crate::proc::{mycpu, ProcId, RecoveryGuard};
use crate::x86::{Trapframe, T_PGFLT};

use super::{reflect, Reflected};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Direction {
    /// user -> kernel
    In,
    /// kernel -> user
    Out,
}

/// Move `buf.len()` bytes between `buf` and `user_address` in `who`'s
/// address space. On any validation or access failure, reflects a page
/// fault to `who`'s parent and returns `Err(Reflected)` instead of
/// completing (spec.md §4.1, §4.6).
///
/// Precondition, enforced by assertion rather than silently upheld: no
/// spinlock held by the current CPU when this is called (spec.md §4.1:
/// "No spinlock may be held across a call to this primitive... Violations
/// are assertion failures").
pub fn usercopy(
    tf: &mut Trapframe,
    who: ProcId,
    dir: Direction,
    buf: &mut [u8],
    user_address: usize,
) -> Result<(), Reflected> {
    debug_assert_eq!(
        crate::spinlock::held_count(),
        0,
        "usercopy: called with a lock held"
    );

    if !pmap::in_usercopy_range(user_address, buf.len()) {
        log::warn!(
            "usercopy: proc {} address 0x{:x} (len {}) out of range",
            who, user_address, buf.len()
        );
        return Err(reflect(tf, who, T_PGFLT, 0));
    }

    log::trace!("usercopy: proc {} {:?} {} bytes at 0x{:x}", who, dir, buf.len(), user_address);
    let guard = RecoveryGuard::enter();
    let pdir = &mut crate::proc::proc_mut(who).pdir;
    let result = match dir {
        Direction::In => pdir.copy_out_bytes(user_address, buf),
        Direction::Out => pdir.copy_in_bytes(user_address, buf),
    };
    drop(guard);

    match result {
        Ok(()) => Ok(()),
        Err(_) => Err(reflect(tf, who, T_PGFLT, 0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::{PTSIZE, USERHI, USERLO};
    use crate::proc::{procinit, set_cpuid};
    use crate::testsupport::{map_private_page, setup_single_proc};

    #[test]
    fn out_of_range_address_reflects_page_fault() {
        procinit();
        set_cpuid(0);
        setup_single_proc(0);
        let mut tf = Trapframe::default();
        let mut buf = [0u8; 16];

        let r = usercopy(&mut tf, 0, Direction::In, &mut buf, USERHI - 4);

        assert!(r.is_err());
        assert_eq!(tf.trapno, T_PGFLT);
        assert!(!crate::proc::recovery_active());
    }

    #[test]
    fn unmapped_address_reflects_page_fault_and_clears_recovery() {
        procinit();
        set_cpuid(0);
        setup_single_proc(0);
        let mut tf = Trapframe::default();
        let mut buf = [0u8; 16];

        let r = usercopy(&mut tf, 0, Direction::Out, &mut buf, USERLO);

        assert!(r.is_err());
        assert_eq!(tf.trapno, T_PGFLT);
        assert!(!crate::proc::recovery_active());
    }

    #[test]
    fn successful_copy_round_trips_and_clears_recovery() {
        procinit();
        set_cpuid(0);
        setup_single_proc(0);
        map_private_page(0, USERLO, &[0xAB; 4096]);

        let mut tf = Trapframe::default();
        let mut out = [0u8; 8];
        let r = usercopy(&mut tf, 0, Direction::In, &mut out, USERLO + 100);
        assert!(r.is_ok());
        assert_eq!(out, [0xAB; 8]);
        assert!(!crate::proc::recovery_active());

        let mut in_buf = [0x11u8; 8];
        let r = usercopy(&mut tf, 0, Direction::Out, &mut in_buf, USERLO + 100);
        assert!(r.is_ok());

        let mut verify = [0u8; 8];
        usercopy(&mut tf, 0, Direction::In, &mut verify, USERLO + 100).unwrap();
        assert_eq!(verify, [0x11u8; 8]);
        let _ = PTSIZE;
    }
}
