// Scheduler contract stub (spec.md §6, "Scheduler contract (collaborator)"):
// proc_alloc / proc_wait / proc_ready / proc_ret. Grounded on the
// teacher's own allocproc/sleep/wakeup state machine in `proc.rs`,
// generalized down to spec.md's four-state STOP/READY/RUN/WAIT machine
// and the single child-table rendezvous spec.md §4.7 describes, rather
// than xv6's generic sleep-channel wakeup.
//
// No real run-queue balancing or preemption lives here: just enough of
// the ready/run/wait transitions for PUT/GET/RET to be observably
// correct, which is what SPEC_FULL.md §6A scopes this stub to.

use alloc::collections::VecDeque;

use crate::proc::{proc_mut, ProcId, Procstate};
use crate::spinlock::Spinlock;
use crate::x86::{Trapframe, SYSCALL_INSN_LEN};

/// Propagated up through `?` the same way a reflected fault is: the
/// caller suspended rather than completing, so nothing past this point
/// in the handler runs (spec.md §4.7, "all pre-wait work must be
/// confined to non-state-mutating operations").
pub struct Blocked;

static mut READY_QUEUE: Option<VecDeque<ProcId>> = None;
static mut READY_LOCK: Spinlock = Spinlock::init_lock("ready");

pub fn init() {
    unsafe { READY_QUEUE = Some(VecDeque::new()) };
}

fn ready_queue() -> &'static mut VecDeque<ProcId> {
    unsafe {
        READY_QUEUE
            .as_mut()
            .expect("sched::init must run before first use")
    }
}

/// Allocate a fresh child parented at `parent` (spec.md §6,
/// `proc_alloc(parent, slot) -> proc?`). PUT calls this only once it
/// has confirmed the slot is empty; the table write itself lives in
/// `proc::alloc_proc`, kept separate so this module stays a thin
/// wrapper around the named collaborator contract rather than owning
/// table storage.
pub fn proc_alloc(parent: ProcId) -> ProcId {
    crate::proc::alloc_proc(parent)
}

/// Block `parent` on `child`: save `tf` into the parent's own save
/// area, transition it to WAIT, and record which child it is waiting
/// on so `proc_ret` knows whom to wake (spec.md §4.7). The parent's
/// lock must already be held by the caller and is released by the
/// caller immediately after this returns, per spec.md §5's locking
/// discipline -- this function does not touch the lock itself.
pub fn proc_wait(parent: ProcId, child: ProcId, tf: &Trapframe) -> Blocked {
    log::debug!("sched: proc {} -> WAIT on child {}", parent, child);
    let p = proc_mut(parent);
    p.sv.tf = *tf;
    p.state = Procstate::Wait;
    p.wait_child = Some(child);
    Blocked
}

/// Mark `child` READY: the scheduler will eventually run it (spec.md
/// §4.4 step 8).
pub fn proc_ready(child: ProcId) {
    log::debug!("sched: proc {} -> READY", child);
    proc_mut(child).state = Procstate::Ready;
    unsafe { READY_LOCK.acquire() };
    ready_queue().push_back(child);
    unsafe { READY_LOCK.release() };
}

/// Transition `who` out of RUN and hand control to its parent (spec.md
/// §4.6's reflection tail and §4.8's RET): save `tf` into `who`'s own
/// save area, optionally advancing `eip` past the syscall instruction
/// so a later resumption does not retry it, mark `who` STOP, and if its
/// parent was WAITing specifically on `who`, wake the parent to READY.
///
/// `advance_eip` is true only for RET (spec.md §4.8); a reflected fault
/// leaves `eip` exactly where the hardware trap would have landed so
/// the parent observes the child's original `INT` address (spec.md §8
/// scenario 2).
pub fn proc_ret(who: ProcId, tf: &Trapframe, advance_eip: bool) {
    let mut saved = *tf;
    if advance_eip {
        saved.eip = saved.eip.wrapping_add(SYSCALL_INSN_LEN);
    }
    let parent = {
        let p = proc_mut(who);
        p.sv.tf = saved;
        p.state = Procstate::Stop;
        p.runcpu = None;
        p.parent
    };
    log::debug!("sched: proc {} -> STOP", who);
    if let Some(parent_id) = parent {
        let pp = proc_mut(parent_id);
        if pp.state == Procstate::Wait && pp.wait_child == Some(who) {
            log::debug!("sched: waking parent {} (was waiting on {})", parent_id, who);
            pp.wait_child = None;
            pp.state = Procstate::Ready;
            unsafe { READY_LOCK.acquire() };
            ready_queue().push_back(parent_id);
            unsafe { READY_LOCK.release() };
        }
    }
}

#[cfg(test)]
pub fn pop_ready() -> Option<ProcId> {
    unsafe { READY_LOCK.acquire() };
    let r = ready_queue().pop_front();
    unsafe { READY_LOCK.release() };
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::{procinit, proc_ref};

    fn setup() {
        procinit();
        init();
    }

    #[test]
    fn proc_ready_enqueues_and_marks_ready() {
        setup();
        let child = crate::proc::alloc_proc(0);
        proc_ready(child);
        assert_eq!(proc_ref(child).state, Procstate::Ready);
        assert_eq!(pop_ready(), Some(child));
    }

    #[test]
    fn proc_ret_wakes_a_waiting_parent() {
        setup();
        let child = crate::proc::alloc_proc(0);
        let tf = Trapframe::default();
        proc_wait(0, child, &tf);
        assert_eq!(proc_ref(0).state, Procstate::Wait);

        proc_ret(child, &tf, false);

        assert_eq!(proc_ref(child).state, Procstate::Stop);
        assert_eq!(proc_ref(0).state, Procstate::Ready);
        assert_eq!(proc_ref(0).wait_child, None);
        assert_eq!(pop_ready(), Some(0));
    }

    #[test]
    fn proc_ret_advances_eip_only_when_asked() {
        setup();
        let mut tf = Trapframe::default();
        tf.eip = 0x1000;
        proc_ret(0, &tf, true);
        assert_eq!(proc_ref(0).sv.tf.eip, 0x1000 + SYSCALL_INSN_LEN);

        tf.eip = 0x2000;
        proc_ret(0, &tf, false);
        assert_eq!(proc_ref(0).sv.tf.eip, 0x2000);
    }
}
