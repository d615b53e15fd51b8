// A spinning mutual-exclusion lock, directly grounded on the
// teacher's `src/kernel/spinlock.rs`: same acquire/release/holding
// shape and the same push_off/pop_off interrupt-nesting discipline,
// adapted from RISC-V's `intr_get/intr_off/intr_on` to the x86
// primitives this crate actually needs.
//
// spec.md §5 requires that no lock is ever held across `usercopy`
// (its unwind path would otherwise leak it); `held_count()` lets
// `usercopy` assert that at entry.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::proc::mycpu;
use crate::x86::{intr_get, intr_off, intr_on};

pub struct Spinlock {
    locked: AtomicBool,
    name: &'static str,
}

impl Spinlock {
    pub const fn init_lock(name: &'static str) -> Self {
        Spinlock {
            locked: AtomicBool::new(false),
            name,
        }
    }

    pub fn acquire(&mut self) {
        push_off();
        if self.locked.load(Ordering::Relaxed) {
            panic!("acquire: {} already held on this cpu", self.name);
        }
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
    }

    pub fn release(&mut self) {
        if !self.locked.load(Ordering::Relaxed) {
            panic!("release: {} not held", self.name);
        }
        self.locked.store(false, Ordering::Release);
        pop_off();
    }

    pub fn holding(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// push_off/pop_off are matched like intr_off()/intr_on(), except
/// nested: it takes two pop_off()s to undo two push_off()s, and if
/// interrupts were already off, push_off/pop_off leaves them off.
pub fn push_off() {
    let old = intr_get();
    intr_off();
    let cpu = mycpu();
    if cpu.noff == 0 {
        cpu.intena = old;
    }
    cpu.noff += 1;
}

/// Number of `push_off`s outstanding on this CPU, i.e. the depth of
/// nested `Spinlock::acquire` calls currently held. `usercopy` asserts
/// this is zero before touching user memory (spec.md §4.1/§5: "No
/// spinlock may be held across a call to this primitive").
pub fn held_count() -> u8 {
    mycpu().noff
}

pub fn pop_off() {
    let cpu = mycpu();
    if intr_get() {
        panic!("pop_off: interruptible");
    }
    if cpu.noff < 1 {
        panic!("pop_off: unbalanced");
    }
    cpu.noff -= 1;
    if cpu.noff == 0 && cpu.intena {
        intr_on();
    }
}
