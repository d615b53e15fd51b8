// Low-level x86 primitives: register/segment/eflags layout and the
// trapframe the trap-entry trampoline (out of scope, see spec §1)
// hands to the dispatcher. Plays the same role this crate's teacher
// gives `riscv.rs`, but the register set, selector layout, and
// trap-number space are the ones spec.md actually names: eax/ebx/ecx/
// edx/esi/edi, cs/ds/es/ss, eflags, INT 0x30.

use core::arch::asm;

pub const PGSIZE: usize = 4096;

// GDT selectors, matching the segment values spec.md §4.4 step 4
// forces onto a child's save-area after a REGS transfer.
pub const GDT_UCODE: u16 = 3 << 3;
pub const GDT_UDATA: u16 = 4 << 3;
pub const DPL_USER: u16 = 3;

pub const SEG_UCODE: u16 = GDT_UCODE | DPL_USER;
pub const SEG_UDATA: u16 = GDT_UDATA | DPL_USER;

// EFLAGS bits user code is allowed to set directly (CF, PF, AF, ZF,
// SF, DF, OF) plus the interrupt-enable bit the PUT handler forces on
// separately after masking.
pub const FL_CF: u32 = 1 << 0;
pub const FL_PF: u32 = 1 << 2;
pub const FL_AF: u32 = 1 << 4;
pub const FL_ZF: u32 = 1 << 6;
pub const FL_SF: u32 = 1 << 7;
pub const FL_IF: u32 = 1 << 9;
pub const FL_DF: u32 = 1 << 10;
pub const FL_OF: u32 = 1 << 11;
pub const FL_USER: u32 = FL_CF | FL_PF | FL_AF | FL_ZF | FL_SF | FL_DF | FL_OF;

// Synthesized hardware trap numbers used when reflecting a fault.
pub const T_PGFLT: u32 = 14; // page fault
pub const T_GPFLT: u32 = 13; // general protection fault

// Length in bytes of the `INT 0x30` instruction user code traps through
// to reach this dispatcher. RET (spec.md §4.8) advances `eip` past it so
// a resumed parent does not re-execute the trap; PUT/GET never advance,
// since a reflected fault must leave the child's `eip` exactly where the
// hardware trap would have landed (spec.md §8 scenario 2).
pub const SYSCALL_INSN_LEN: u32 = 2;

// Integer register save-area, transferred wholesale by REGS.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
#[repr(C)]
pub struct Regs {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
}

// Opaque FPU/extended-state block. Contents are never interpreted by
// the dispatcher, only moved wholesale when FPU is set.
#[derive(Copy, Clone, Debug)]
#[repr(C)]
pub struct FxState(pub [u8; 512]);

impl Default for FxState {
    fn default() -> Self {
        FxState([0; 512])
    }
}
impl PartialEq for FxState {
    fn eq(&self, other: &Self) -> bool {
        self.0[..] == other.0[..]
    }
}
impl Eq for FxState {}

// Trapframe: captured user CPU state at trap entry. Handlers only
// ever mutate `trapno`/`err`, and only when reflecting a fault
// (spec.md §3, §4.6). Everything else is read-only input from the
// dispatcher's point of view.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
#[repr(C)]
pub struct Trapframe {
    pub regs: Regs,
    pub trapno: u32,
    pub err: u32,
    pub eip: u32,
    pub cs: u16,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u16,
    pub ds: u16,
    pub es: u16,
}

// The register save-area a process keeps in its Proc: the trapframe
// plus the opaque FPU block. REGS transfers just the trapframe-sized
// prefix; REGS|FPU transfers the whole thing (spec.md §4.4 step 4 /
// §4.5).
#[derive(Copy, Clone, Default, PartialEq, Debug)]
#[repr(C)]
pub struct SaveArea {
    pub tf: Trapframe,
    pub fx: FxState,
}

impl SaveArea {
    // Length of the integer-registers-only prefix, i.e. everything up
    // to (not including) `fx`. Mirrors the C `offsetof(procstate, fx)`
    // the teacher's syscall.c computes for a REGS-without-FPU transfer.
    pub const INT_LEN: usize = core::mem::size_of::<Trapframe>();
    pub const FULL_LEN: usize = core::mem::size_of::<SaveArea>();
}

// Read/write EFLAGS. On real hardware this is `pushfl`/`popfl`; kept
// behind a function so the dispatcher never depends on the asm
// directly, the same separation `riscv.rs` draws around CSR access.
#[cfg(not(test))]
pub fn read_eflags() -> u32 {
    let mut x: u32;
    unsafe { asm!("pushfd", "pop {0}", out(reg) x, options(nostack)) }
    x
}

#[cfg(test)]
pub fn read_eflags() -> u32 {
    0
}

#[cfg(not(test))]
pub fn intr_get() -> bool {
    read_eflags() & FL_IF != 0
}

#[cfg(test)]
pub fn intr_get() -> bool {
    crate::testsupport::test_intr_get()
}

#[cfg(not(test))]
pub fn intr_off() {
    unsafe { asm!("cli", options(nomem, nostack)) }
}

#[cfg(test)]
pub fn intr_off() {
    crate::testsupport::test_set_intr(false)
}

#[cfg(not(test))]
pub fn intr_on() {
    unsafe { asm!("sti", options(nomem, nostack)) }
}

#[cfg(test)]
pub fn intr_on() {
    crate::testsupport::test_set_intr(true)
}
