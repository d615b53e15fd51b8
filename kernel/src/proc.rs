// Process object & table (spec.md §3) and the per-CPU block (spec.md
// §3, "Per-CPU block"). Grounded on the teacher's `proc.rs`: a fixed
// `[Proc; NPROC]` table, a per-CPU struct tracking the running
// process, and the same `push_off`/`noff` interrupt-nesting counter
// `spinlock.rs` drives — generalized from xv6's UNUSED/USED/SLEEPING/
// RUNNABLE/RUNNING/ZOMBIE state machine down to the four states
// spec.md §3 actually names: STOP/READY/RUN/WAIT.

use core::mem::MaybeUninit;

use crate::param::{NCHILD, NCPU, NPROC};
use crate::pmap::AddrSpace;
use crate::spinlock::Spinlock;
use crate::x86::SaveArea;

pub type ProcId = usize;

/// Sentinel returned by GET on a child slot that was never allocated
/// (spec.md §3 invariant 4, §9 "Null process as sentinel"): a single
/// immutable, always-STOP process, shared by every lookup that misses.
pub const NULL_PROC: ProcId = NPROC;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Procstate {
    Stop,
    Ready,
    Run,
    Wait,
}

pub struct Proc {
    pub lock: Spinlock,
    pub state: Procstate,
    pub pid: u32,
    pub name: &'static str,
    pub sv: SaveArea,
    pub pdir: AddrSpace,
    pub rpdir: AddrSpace,
    pub child: [Option<ProcId>; NCHILD],
    pub parent: Option<ProcId>,
    pub runcpu: Option<usize>,
    /// Set while this process is WAITing on a specific child, so the
    /// scheduler stub knows who to wake when that child reaches STOP.
    pub wait_child: Option<ProcId>,
    /// True once this slot holds a live process, independent of
    /// `parent`: the tree's root process has `parent == None` too, so
    /// `alloc_proc` cannot use a bare `parent.is_none()` check to find
    /// free slots without risking reclaiming the root (spec.md §3
    /// invariant 2). Set once, at allocation time, and never cleared --
    /// this subsystem names no exit path for a live process.
    pub in_use: bool,
}

impl Proc {
    fn new(pid: u32, name: &'static str) -> Self {
        Proc {
            lock: Spinlock::init_lock("proc"),
            state: Procstate::Stop,
            pid,
            name,
            sv: SaveArea::default(),
            pdir: AddrSpace::empty(),
            rpdir: AddrSpace::empty(),
            child: [None; NCHILD],
            parent: None,
            runcpu: None,
            wait_child: None,
            in_use: false,
        }
    }
}

static mut PROCS: MaybeUninit<[Proc; NPROC]> = MaybeUninit::uninit();
static mut NULL_PROCESS: MaybeUninit<Proc> = MaybeUninit::uninit();
static mut PROCS_READY: bool = false;
static mut NEXT_PID: u32 = 1;
static mut NEXT_FREE: usize = 0;

/// Build the process table. Real kernel boot calls it once; tests
/// call it at the top of every fixture to start from a clean table.
pub fn procinit() {
    unsafe {
        PROCS.write(core::array::from_fn(|_| Proc::new(0, "")));
        NULL_PROCESS.write(Proc::new(0, "null"));
        NEXT_PID = 1;
        NEXT_FREE = 0;
        PROCS_READY = true;
    }
}

fn table() -> &'static mut [Proc; NPROC] {
    unsafe {
        debug_assert!(PROCS_READY, "procinit must run before first use");
        PROCS.assume_init_mut()
    }
}

fn alloc_pid() -> u32 {
    unsafe {
        let pid = NEXT_PID;
        NEXT_PID += 1;
        pid
    }
}

/// Look up a live process by id. Never returns the null sentinel;
/// callers that might be resolving a missing child use
/// [`proc_or_null`] instead.
pub fn proc_mut(id: ProcId) -> &'static mut Proc {
    assert!(id < NPROC, "proc_mut: id {} is the null sentinel", id);
    &mut table()[id]
}

pub fn proc_ref(id: ProcId) -> &'static Proc {
    assert!(id < NPROC, "proc_ref: id {} is the null sentinel", id);
    &table()[id]
}

/// Resolve a (possibly absent) child, returning the null sentinel
/// read-only when `id` is `NULL_PROC`. Used by GET, which must not
/// allocate (spec.md §4.5).
pub fn proc_or_null(id: ProcId) -> &'static Proc {
    if id == NULL_PROC {
        unsafe { NULL_PROCESS.assume_init_ref() }
    } else {
        proc_ref(id)
    }
}

/// Allocate a fresh process parented at `parent_id`, panicking if the
/// table is full (spec.md §4.4 step 1: "on allocator failure the
/// kernel panics"). A slot is reusable only if it has never been
/// claimed as a child: this subsystem names no exit path for PUT/GET/
/// RET/CPUTS, so once parented a process lives for its parent's
/// lifetime (spec.md §3 invariant 2).
///
/// Free slots are identified by `in_use`, not by `parent.is_none()`:
/// the tree's root process also has `parent == None`, so a
/// `parent`-only test would eventually let `NEXT_FREE`'s round-robin
/// wrap back onto the root's slot and clobber it out from under a
/// running process.
pub fn alloc_proc(parent_id: ProcId) -> ProcId {
    unsafe {
        for _ in 0..NPROC {
            let i = NEXT_FREE;
            NEXT_FREE = (NEXT_FREE + 1) % NPROC;
            if !table()[i].in_use && i != parent_id {
                let pid = alloc_pid();
                table()[i] = Proc::new(pid, "child");
                table()[i].parent = Some(parent_id);
                table()[i].in_use = true;
                return i;
            }
        }
    }
    panic!("alloc_proc: no free process slots");
}

// --- per-CPU block -----------------------------------------------------

#[derive(Copy, Clone)]
pub struct Cpu {
    pub proc: Option<ProcId>,
    pub noff: u8,
    pub intena: bool,
    /// True while a `usercopy` recovery scope is active on this CPU
    /// (spec.md §3, per-CPU block invariant: at most one at a time).
    pub recovering: bool,
}

impl Cpu {
    const fn new() -> Self {
        Cpu {
            proc: None,
            noff: 0,
            intena: false,
            recovering: false,
        }
    }
}

static mut CPUS: [Cpu; NCPU] = [Cpu::new(); NCPU];
static mut CURRENT_CPU: usize = 0;

/// Which CPU "took the trap" executing the current syscall. On real
/// hardware this reads a per-CPU id register; tests select it
/// explicitly to model multiple CPUs without real concurrency.
pub fn cpuid() -> usize {
    unsafe { CURRENT_CPU }
}

#[cfg(test)]
pub fn set_cpuid(id: usize) {
    unsafe { CURRENT_CPU = id };
}

pub fn mycpu() -> &'static mut Cpu {
    unsafe { &mut CPUS[cpuid()] }
}

/// The process currently running on this CPU, i.e. the syscall
/// caller. Handlers assert it is in RUN state and owns this CPU
/// (spec.md §4.4/§4.5 precondition).
pub fn myproc() -> &'static mut Proc {
    let id = mycpu().proc.expect("myproc: no process scheduled on this cpu");
    proc_mut(id)
}

pub fn set_myproc(id: Option<ProcId>) {
    mycpu().proc = id;
}

/// The id of the process currently running on this CPU, i.e. the
/// syscall caller (spec.md §4.4/§4.5 precondition: `state == RUN` and
/// `runcpu` identifies this CPU).
pub fn current() -> ProcId {
    mycpu().proc.expect("current: no process scheduled on this cpu")
}

/// RAII guard for the per-CPU recovery scope `usercopy` installs
/// before touching user memory (spec.md §4.1). Panics on re-entrant
/// install, enforcing the "strictly nested" invariant; `Drop` clears
/// it on every exit path, including the early-return-via-`?` path a
/// reflected fault takes, which is how this crate satisfies "usercopy
/// never returns with the recovery handler still installed" without
/// hand-unwinding at each call site (spec.md §9 names this as the
/// equivalent tagged-result alternative to a non-local jump).
pub struct RecoveryGuard;

impl RecoveryGuard {
    pub fn enter() -> Self {
        let cpu = mycpu();
        assert!(!cpu.recovering, "usercopy: recovery scope already active");
        cpu.recovering = true;
        RecoveryGuard
    }
}

impl Drop for RecoveryGuard {
    fn drop(&mut self) {
        mycpu().recovering = false;
    }
}

#[cfg(test)]
pub fn recovery_active() -> bool {
    mycpu().recovering
}
