// Internal error plumbing shared between `pmap`, `palloc`, and the
// syscall handlers. Never surfaced to user space directly: the
// dispatcher's only outward-facing outcomes are "resume the caller",
// "reflect a trap to the parent" (spec.md §4.6), or "panic" (spec.md
// §7 class 3). This enum exists so those internal collaborators can
// report failure the idiomatic Rust way (`Result`) instead of the
// null-pointer/-1 sentinels the C original uses.

use core::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KernelError {
    /// Physical frame allocator exhausted.
    OutOfFrames,
    /// A user address range failed validation (out of range, wraps,
    /// or misaligned for the operation's granularity).
    BadAddress,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::OutOfFrames => write!(f, "out of physical frames"),
            KernelError::BadAddress => write!(f, "invalid user address range"),
        }
    }
}

pub type KResult<T> = Result<T, KernelError>;
