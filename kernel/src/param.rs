// Compile-time kernel constants.
//
// Sized for an instructional build: small enough that the fixed-size
// process and child tables, and the page-map's page array, all fit
// without a real physical-memory allocator behind them.

use crate::x86::PGSIZE;

// Maximum number of CPUs this kernel schedules across.
pub const NCPU: usize = 4;

// Maximum number of live processes.
pub const NPROC: usize = 64;

// Width of a process's child-slot array. Indices are the low 8 bits
// of the child-index register, so this must stay at 256.
pub const NCHILD: usize = 256;

// Size, in bytes, of one page-table-group region (what spec.md calls
// "page-table alignment" for COPY/ZERO/MERGE). x86-style two-level
// paging: 1024 PTEs of PGSIZE each per page-table page.
pub const PTSIZE: usize = 1024 * PGSIZE;

// User virtual address range. Kept small (four page-table groups)
// so the per-process page map can be a plain fixed-size array instead
// of requiring a working heap allocator to exercise in tests.
pub const USERLO: usize = 0x0040_0000;
pub const USERHI: usize = USERLO + 4 * PTSIZE;

// Number of page-table groups spanned by [USERLO, USERHI).
pub const NPTGROUP: usize = (USERHI - USERLO) / PTSIZE;
// Number of pages spanned by [USERLO, USERHI).
pub const NUSERPAGE: usize = (USERHI - USERLO) / PGSIZE;

// Physical frame capacity of palloc. Independent of NPROC * NUSERPAGE:
// COPY shares frames rather than duplicating them, so real workloads
// need far fewer distinct frames than the worst case of zero sharing.
// Running past this is a resource-exhaustion panic per design (spec
// error class 3), which is acceptable for this instructional build.
pub const NFRAME: usize = 8192;

// Maximum bytes CPUTS will copy in from user space before truncating.
pub const CPUTS_MAX: usize = 256;
