// `#[cfg(test)]`-only harness (SPEC_FULL.md §2, `testsupport`):
// std-backed fakes for the pieces spec.md names as external
// collaborators (console sink, interrupt-enable flag) plus fixture
// builders for a single running process, so the dispatcher in
// `syscall/` is exercised without real hardware. Modeled on
// `tock-tock/arch/riscv/src/pmp.rs`'s `#[cfg(test)] mod test` approach
// of testing low-level logic with plain `#[test]` functions rather than
// a separate integration harness.
//
// All of this module's statics are process-wide, not per-test, because
// the subsystem under test (the process table, the frame allocator) is
// itself process-wide `static mut` state mirroring the teacher's own
// globals. Run this crate's tests single-threaded
// (`cargo test -- --test-threads=1`): cargo's default parallel test
// runner would otherwise let two tests race on the same `PROCS`/
// `FRAME_TABLE` statics.

use crate::param::USERLO;
use crate::pmap;
use crate::proc::{proc_mut, set_myproc, ProcId, Procstate};
use crate::x86::PGSIZE;

static mut INTR_ENABLED: bool = false;

pub fn test_intr_get() -> bool {
    unsafe { INTR_ENABLED }
}

pub fn test_set_intr(on: bool) {
    unsafe { INTR_ENABLED = on };
}

static mut CONSOLE_BUF: alloc::vec::Vec<u8> = alloc::vec::Vec::new();

pub fn test_console_write(bytes: &[u8]) {
    unsafe { CONSOLE_BUF.extend_from_slice(bytes) };
}

/// Drain and return everything written to the test console so far.
pub fn take_console_output() -> alloc::vec::Vec<u8> {
    unsafe { core::mem::take(&mut CONSOLE_BUF) }
}

/// Build a single RUN process with an empty address space, current on
/// CPU 0, parented at the root (no parent). Most dispatcher tests start
/// here and then PUT/GET against child index N.
pub fn setup_single_proc(id: ProcId) {
    crate::palloc::init();
    crate::sched::init();
    take_console_output();

    let p = proc_mut(id);
    p.state = Procstate::Run;
    p.runcpu = Some(crate::proc::cpuid());
    p.parent = None;
    p.in_use = true;
    p.pdir = pmap::AddrSpace::empty();
    p.rpdir = pmap::AddrSpace::empty();
    set_myproc(Some(id));
}

/// Map a fresh, privately-owned, writable page at `va` in `proc`'s
/// address space and fill it with `data`. Used by tests to set up the
/// mapped regions PUT/GET/usercopy read from or write into.
pub fn map_private_page(proc: ProcId, va: usize, data: &[u8; PGSIZE]) {
    debug_assert_eq!(va % PGSIZE, 0, "map_private_page: va must be page-aligned");
    debug_assert!(va >= USERLO, "map_private_page: va must be in the user range");
    let p = proc_mut(proc);
    assert!(
        pmap::setperm(&mut p.pdir, va, PGSIZE, true),
        "map_private_page: out of frames"
    );
    p.pdir
        .write_page(va, data)
        .expect("map_private_page: just mapped, write cannot fail");
}
