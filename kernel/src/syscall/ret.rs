// RET handler (spec.md §4.8). Grounded on the original `do_ret` in
// `kern/syscall.c`: transition the caller out of RUN and hand control
// to its parent, advancing past the `INT` instruction so a later
// resumption of the caller (once some future PUT starts it again)
// doesn't retry the RET itself.

use crate::proc::current;
use crate::sched;
use crate::x86::Trapframe;

pub fn ret(tf: &mut Trapframe) {
    let who = current();
    log::debug!("ret: proc {} stopping", who);
    sched::proc_ret(who, tf, true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::{procinit, proc_ref, set_cpuid, Procstate};
    use crate::sched;
    use crate::testsupport::setup_single_proc;
    use crate::x86::SYSCALL_INSN_LEN;

    #[test]
    fn ret_stops_the_caller_and_advances_eip() {
        procinit();
        set_cpuid(0);
        setup_single_proc(0);
        sched::init();

        let mut tf = Trapframe::default();
        tf.eip = 0x4000;
        ret(&mut tf);

        assert_eq!(proc_ref(0).state, Procstate::Stop);
        assert_eq!(proc_ref(0).sv.tf.eip, 0x4000 + SYSCALL_INSN_LEN);
    }

    #[test]
    fn ret_wakes_a_waiting_parent() {
        procinit();
        set_cpuid(0);
        setup_single_proc(0);
        sched::init();

        let child = crate::proc::alloc_proc(0);
        let wait_tf = Trapframe::default();
        sched::proc_wait(0, child, &wait_tf);
        assert_eq!(proc_ref(0).state, Procstate::Wait);

        crate::proc::set_myproc(Some(child));
        let mut tf = Trapframe::default();
        ret(&mut tf);

        assert_eq!(proc_ref(child).state, Procstate::Stop);
        assert_eq!(proc_ref(0).state, Procstate::Ready);
    }
}
