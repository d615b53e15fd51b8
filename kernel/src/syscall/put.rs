// PUT handler: parent -> child (spec.md §4.4). Grounded directly on
// the original `do_put` in `kern/syscall.c`: resolve-or-allocate the
// child slot under the parent's lock, wait if the child isn't STOP,
// release the lock before touching any user memory, then REGS / MEMOP
// (COPY|ZERO) / PERM / SNAP / START in that exact order.

use crate::param::NCHILD;
use crate::pmap;
use crate::proc::{current, proc_mut, proc_ref, Procstate};
use crate::sched;
use crate::x86::{SaveArea, Trapframe, SEG_UCODE, SEG_UDATA, FL_IF, FL_USER, T_GPFLT};

use super::cmd::{self, MemOp};
use super::reflect;
use super::usercopy::{usercopy, Direction};
use super::Reflected;

pub fn put(tf: &mut Trapframe, cmd: u32) -> Result<(), Reflected> {
    let parent = current();
    debug_assert_eq!(proc_ref(parent).state, Procstate::Run);

    proc_mut(parent).lock.acquire();

    // Step 1: resolve or allocate the named child slot.
    let cn = (tf.regs.edx & 0xff) as usize % NCHILD;
    let child = match proc_ref(parent).child[cn] {
        Some(c) => c,
        None => {
            let c = sched::proc_alloc(parent);
            proc_mut(parent).child[cn] = Some(c);
            c
        }
    };

    log::debug!("put: proc {} resolved child slot {} -> proc {}", parent, cn, child);

    // Step 2: synchronize with the child if it isn't already STOP.
    if proc_ref(child).state != Procstate::Stop {
        log::debug!("put: proc {} waiting on child {} to reach STOP", parent, child);
        sched::proc_wait(parent, child, tf);
        proc_mut(parent).lock.release();
        return Ok(()); // retried from the top once the child reaches STOP
    }

    // Step 3: release the parent lock before any user-memory access.
    proc_mut(parent).lock.release();

    // Step 4: REGS / REGS|FPU.
    if cmd::has_regs(cmd) {
        log::trace!("put: transferring REGS (fpu={}) to child {}", cmd::has_fpu(cmd), child);
        let len = if cmd::has_fpu(cmd) {
            SaveArea::FULL_LEN
        } else {
            SaveArea::INT_LEN
        };
        let mut buf = [0u8; SaveArea::FULL_LEN];
        let uva = tf.regs.ebx as usize;
        usercopy(tf, parent, Direction::In, &mut buf[..len], uva)?;

        let cp = proc_mut(child);
        let dst = &mut cp.sv as *mut SaveArea as *mut u8;
        unsafe { core::ptr::copy_nonoverlapping(buf.as_ptr(), dst, len) };

        cp.sv.tf.ds = SEG_UDATA;
        cp.sv.tf.es = SEG_UDATA;
        cp.sv.tf.cs = SEG_UCODE;
        cp.sv.tf.ss = SEG_UDATA;
        cp.sv.tf.eflags &= FL_USER;
        cp.sv.tf.eflags |= FL_IF;
    }

    // Step 5: MEMOP.
    let sva = tf.regs.esi as usize;
    let dva = tf.regs.edi as usize;
    let size = tf.regs.ecx as usize;
    match cmd::decode_memop(cmd) {
        MemOp::None => {}
        MemOp::Copy => {
            if !pmap::pt_aligned(sva, size) || !pmap::in_user_range(sva, size) {
                return Err(reflect(tf, parent, T_GPFLT, 0));
            }
            if !pmap::pt_aligned(dva, size) || !pmap::in_user_range(dva, size) {
                return Err(reflect(tf, parent, T_GPFLT, 0));
            }
            let src = proc_ref(parent);
            let dst = proc_mut(child);
            pmap::copy(&src.pdir, sva, &mut dst.pdir, dva, size);
        }
        MemOp::Zero => {
            if !pmap::pt_aligned(dva, size) || !pmap::in_user_range(dva, size) {
                return Err(reflect(tf, parent, T_GPFLT, 0));
            }
            pmap::remove(&mut proc_mut(child).pdir, dva, size);
        }
        MemOp::Merge => {
            // MERGE is only valid on GET (spec.md §4.2, §4.4).
            return Err(reflect(tf, parent, T_GPFLT, 0));
        }
    }

    // Step 6: PERM.
    if cmd::has_perm(cmd) {
        if !pmap::pg_aligned(dva, size) || !pmap::in_user_range(dva, size) {
            return Err(reflect(tf, parent, T_GPFLT, 0));
        }
        if !pmap::setperm(&mut proc_mut(child).pdir, dva, size, cmd::has_rw(cmd)) {
            log::error!("put: out of physical frames setting permissions for child {}", child);
            panic!("put: no memory to set permissions");
        }
    }

    // Step 7: SNAP -- establish a fresh merge baseline over the whole
    // user range.
    if cmd::has_snap(cmd) {
        log::trace!("put: snapshotting child {} as a merge baseline", child);
        let (lo, sz) = pmap::USER_RANGE;
        let cp = proc_mut(child);
        pmap::snapshot(&cp.pdir, &mut cp.rpdir, lo, sz);
    }

    // Step 8: START.
    if cmd::has_start(cmd) {
        log::debug!("put: starting child {}", child);
        sched::proc_ready(child);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::{PTSIZE, USERLO};
    use crate::proc::{procinit, set_cpuid, NULL_PROC};
    use crate::testsupport::{map_private_page, setup_single_proc};

    fn regs_cmd() -> u32 {
        cmd::TYPE_PUT | cmd::REGS
    }

    #[test]
    fn allocates_child_on_first_reference() {
        procinit();
        set_cpuid(0);
        setup_single_proc(0);
        sched::init();

        let mut tf = Trapframe::default();
        tf.regs.edx = 7;
        let r = put(&mut tf, cmd::TYPE_PUT);
        assert!(r.is_ok());
        assert!(proc_ref(0).child[7].is_some());
    }

    #[test]
    fn child_index_is_identity_stable_across_repeated_puts() {
        procinit();
        set_cpuid(0);
        setup_single_proc(0);
        sched::init();

        let mut tf = Trapframe::default();
        tf.regs.edx = 3;
        put(&mut tf, cmd::TYPE_PUT).unwrap();
        let first = proc_ref(0).child[3].unwrap();

        put(&mut tf, cmd::TYPE_PUT).unwrap();
        let second = proc_ref(0).child[3].unwrap();

        assert_eq!(first, second);
        assert_ne!(Some(first), proc_ref(0).child[4]);
        let _ = NULL_PROC;
    }

    #[test]
    fn unaligned_copy_is_rejected_and_nothing_is_mutated() {
        procinit();
        set_cpuid(0);
        setup_single_proc(0);
        sched::init();

        map_private_page(0, USERLO, &[0x42; 4096]);

        let mut tf = Trapframe::default();
        tf.regs.edx = 1;
        tf.regs.esi = USERLO as u32;
        tf.regs.edi = USERLO as u32;
        tf.regs.ecx = 1; // not page-table aligned
        let cmd = cmd::TYPE_PUT | cmd::MEMOP_COPY;

        let r = put(&mut tf, cmd);
        assert!(r.is_err());
        assert_eq!(tf.trapno, T_GPFLT);

        let child = proc_ref(0).child[1].unwrap();
        assert!(!proc_ref(child).pdir.is_mapped(USERLO));
        let _ = PTSIZE;
    }

    #[test]
    fn copy_start_spawns_a_runnable_child_sharing_the_mapping() {
        procinit();
        set_cpuid(0);
        setup_single_proc(0);
        sched::init();

        map_private_page(0, USERLO, &[0x7; 4096]);

        let mut tf = Trapframe::default();
        tf.regs.edx = 7;
        tf.regs.esi = USERLO as u32;
        tf.regs.edi = USERLO as u32;
        tf.regs.ecx = PTSIZE as u32;
        let cmd = regs_cmd() | cmd::MEMOP_COPY | cmd::START;
        tf.regs.ebx = USERLO as u32; // reuse the mapped page as the REGS source too

        // REGS copies a SaveArea-sized blob from user memory; make sure
        // that whole range is mapped (PTSIZE is several pages).
        for pg in (0..PTSIZE).step_by(4096) {
            map_private_page(0, USERLO + pg, &[0x7; 4096]);
        }

        let r = put(&mut tf, cmd);
        assert!(r.is_ok());

        let child = proc_ref(0).child[7].unwrap();
        assert_eq!(proc_ref(child).state, Procstate::Ready);
        assert!(proc_ref(child).pdir.is_mapped(USERLO));
        assert!(!proc_ref(child).rpdir.is_mapped(USERLO));
    }
}
