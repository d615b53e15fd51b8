// Page-map operations: copy (share-map), remove (unmap), merge
// (three-way merge against a baseline), and setperm, the address-
// space-surgery contract named in spec.md §6. This is core, not a
// stub (spec.md §2 gives it 20% of the implementation weight): what
// *is* out of scope is the underlying frame store, which `palloc`
// provides, and real TLB invalidation, which has no meaning on a
// host running these as plain data structures.
//
// Generalized from the teacher's RISC-V Sv39 three-level `walk` in
// `vm.rs` down to a flat, two-level x86-style address space: a
// page-table group is `PTSIZE` bytes (1024 pages), and COPY/ZERO/
// MERGE require group-granular ("page-table") alignment while PERM
// only requires page granularity, exactly as spec.md §4.2/§4.4/§4.5
// distinguish PTOFF from PGOFF.

use crate::error::{KResult, KernelError};
use crate::palloc::{self, FrameId};
use crate::param::{NUSERPAGE, PTSIZE, USERHI, USERLO};
use crate::x86::PGSIZE;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Perm {
    pub write: bool,
}

impl Perm {
    pub const fn read_only() -> Self {
        Perm { write: false }
    }
    pub const fn of(rw: bool) -> Self {
        Perm { write: rw }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
struct Mapping {
    frame: FrameId,
    perm: Perm,
}

/// A process's page directory: `pdir` when live, `rpdir` when used as
/// a merge baseline (spec.md §3). Both are the same type; which role
/// a given instance plays is purely which field of `Proc` holds it.
#[derive(Clone)]
pub struct AddrSpace {
    pages: alloc::vec::Vec<Option<Mapping>>,
}

impl AddrSpace {
    pub fn empty() -> Self {
        AddrSpace {
            pages: alloc::vec![None; NUSERPAGE],
        }
    }

    fn index(va: usize) -> usize {
        (va - USERLO) / PGSIZE
    }

    fn mapping(&self, va: usize) -> Option<Mapping> {
        self.pages[Self::index(va)]
    }

    fn set_mapping(&mut self, va: usize, m: Option<Mapping>) {
        self.pages[Self::index(va)] = m;
    }

    pub fn is_mapped(&self, va: usize) -> bool {
        self.mapping(va).is_some()
    }

    pub fn perm(&self, va: usize) -> Option<Perm> {
        self.mapping(va).map(|m| m.perm)
    }

    pub fn read_page<'a>(&self, va: usize, out: &'a mut [u8; PGSIZE]) -> bool {
        match self.mapping(va) {
            Some(m) => {
                out.copy_from_slice(palloc::frames().data(m.frame));
                true
            }
            None => false,
        }
    }

    /// Simulates a user process writing to one of its own mapped
    /// pages: privatizes a shared (COW) frame before mutating it.
    /// There is no real CPU executing user code in this crate, so
    /// tests call this directly to set up divergence scenarios for
    /// MERGE (spec.md §8 scenario 4).
    pub fn write_page(&mut self, va: usize, data: &[u8]) -> KResult<()> {
        let m = self.mapping(va).ok_or(KernelError::BadAddress)?;
        let private = palloc::frames().make_private(m.frame)?;
        palloc::frames().data_mut(private)[..data.len()].copy_from_slice(data);
        self.set_mapping(va, Some(Mapping { frame: private, perm: m.perm }));
        Ok(())
    }

    /// Copy `dst.len()` bytes starting at `va` out of this address
    /// space, byte-granular and page-crossing. Backs `usercopy`'s
    /// copy-out direction (spec.md §4.1): unlike `read_page`, `va` need
    /// not be page-aligned and the range may span several pages.
    pub fn copy_out_bytes(&self, va: usize, dst: &mut [u8]) -> KResult<()> {
        let mut done = 0;
        while done < dst.len() {
            let cur = va + done;
            let page_va = cur - cur % PGSIZE;
            let off = cur % PGSIZE;
            let mut page = [0u8; PGSIZE];
            if !self.read_page(page_va, &mut page) {
                return Err(KernelError::BadAddress);
            }
            let n = core::cmp::min(PGSIZE - off, dst.len() - done);
            dst[done..done + n].copy_from_slice(&page[off..off + n]);
            done += n;
        }
        Ok(())
    }

    /// Copy `src` into this address space starting at `va`, privatizing
    /// each touched page first (same copy-on-write discipline as
    /// `write_page`). Backs `usercopy`'s copy-in direction.
    pub fn copy_in_bytes(&mut self, va: usize, src: &[u8]) -> KResult<()> {
        let mut done = 0;
        while done < src.len() {
            let cur = va + done;
            let page_va = cur - cur % PGSIZE;
            let off = cur % PGSIZE;
            let n = core::cmp::min(PGSIZE - off, src.len() - done);
            let m = self.mapping(page_va).ok_or(KernelError::BadAddress)?;
            let private = palloc::frames().make_private(m.frame)?;
            palloc::frames().data_mut(private)[off..off + n].copy_from_slice(&src[done..done + n]);
            self.set_mapping(page_va, Some(Mapping { frame: private, perm: m.perm }));
            done += n;
        }
        Ok(())
    }
}

// --- alignment / range validation -----------------------------------------
//
// Dispatched from put.rs/get.rs *before* calling the operations below;
// these operations assume their ranges are already valid, mirroring
// the teacher's own `walk`/`mappages`, which panic on invariant
// violations rather than re-checking what their callers promised.

pub fn in_user_range(va: usize, size: usize) -> bool {
    va >= USERLO && va <= USERHI && size <= USERHI - va
}

/// The stricter form `usercopy`'s `checkva` uses (spec.md §4.1): strict
/// inequalities on both ends, rather than the `<=`/`<=` the MEMOP/PERM
/// range checks use. A zero-byte copy landing exactly on `USERHI` is
/// valid for a MEMOP range but not for a raw user-pointer dereference.
pub fn in_usercopy_range(va: usize, size: usize) -> bool {
    va >= USERLO && va < USERHI && size < USERHI - va
}

pub fn pt_aligned(va: usize, size: usize) -> bool {
    va % PTSIZE == 0 && size % PTSIZE == 0
}

pub fn pg_aligned(va: usize, size: usize) -> bool {
    va % PGSIZE == 0 && size % PGSIZE == 0
}

// --- operations -------------------------------------------------------------

/// Share-map pages from `src` at `sva` into `dst` at `dva`, for
/// `size` bytes. Unmapped source pages leave the destination unmapped
/// too (sparse regions copy sparsely). Preconditions: `pt_aligned` and
/// `in_user_range` on both ranges, already checked by the caller.
pub fn copy(src: &AddrSpace, sva: usize, dst: &mut AddrSpace, dva: usize, size: usize) {
    let mut off = 0;
    while off < size {
        if let Some(old) = dst.mapping(dva + off) {
            palloc::frames().decref(old.frame);
        }
        match src.mapping(sva + off) {
            Some(m) => {
                palloc::frames().incref(m.frame);
                dst.set_mapping(dva + off, Some(m));
            }
            None => dst.set_mapping(dva + off, None),
        }
        off += PGSIZE;
    }
}

/// Unmap `size` bytes at `dva`, dropping a reference to each mapped
/// frame. Preconditions as `copy`.
pub fn remove(pdir: &mut AddrSpace, dva: usize, size: usize) {
    let mut off = 0;
    while off < size {
        if let Some(m) = pdir.mapping(dva + off) {
            palloc::frames().decref(m.frame);
            pdir.set_mapping(dva + off, None);
        }
        off += PGSIZE;
    }
}

/// Set the RW permission bit over `size` bytes at `dva`. Pages
/// already mapped just get their permission bit flipped. A page with
/// no mapping yet is lazily backed by a fresh zero frame, which is
/// the one path through this module that can run out of frames —
/// hence the `bool` return (spec.md §4.4 step 6: allocator failure on
/// PERM panics, it is not reflected). Precondition: `pg_aligned` and
/// `in_user_range`, already checked by the caller.
pub fn setperm(pdir: &mut AddrSpace, dva: usize, size: usize, rw: bool) -> bool {
    let mut off = 0;
    while off < size {
        let va = dva + off;
        match pdir.mapping(va) {
            Some(mut m) => {
                m.perm = Perm::of(rw);
                pdir.set_mapping(va, Some(m));
            }
            None => match palloc::frames().alloc_zeroed() {
                Ok(frame) => pdir.set_mapping(va, Some(Mapping { frame, perm: Perm::of(rw) })),
                Err(_) => return false,
            },
        }
        off += PGSIZE;
    }
    true
}

/// Three-way merge: for each page in `[sva, sva+size)`, compare
/// `local`'s mapping against `base`'s. Where `local` has diverged
/// (mapped a different frame, or changed presence), `local`'s version
/// is installed into `dst` at the corresponding `dva` offset. Where it
/// has not diverged, `dst` is left untouched, so a caller's own
/// independent edits to the destination region survive (spec.md §4.5,
/// §8 scenario 4). Preconditions as `copy`.
pub fn merge(
    base: &AddrSpace,
    local: &AddrSpace,
    sva: usize,
    dst: &mut AddrSpace,
    dva: usize,
    size: usize,
) {
    let mut off = 0;
    while off < size {
        let b = base.mapping(sva + off);
        let l = local.mapping(sva + off);
        let diverged = match (b, l) {
            (Some(bm), Some(lm)) => bm.frame != lm.frame,
            (None, None) => false,
            _ => true,
        };
        if diverged {
            if let Some(old) = dst.mapping(dva + off) {
                palloc::frames().decref(old.frame);
            }
            match l {
                Some(lm) => {
                    palloc::frames().incref(lm.frame);
                    dst.set_mapping(dva + off, Some(lm));
                }
                None => dst.set_mapping(dva + off, None),
            }
        }
        off += PGSIZE;
    }
}

/// Snapshot `size` bytes of `pdir` into `rpdir` starting at `va` in
/// both (spec.md §4.4 step 7 always snapshots the full user range).
/// Implemented as `copy` onto a freshly emptied baseline so stale
/// mappings outside the copied range don't linger as phantom
/// baseline state.
pub fn snapshot(pdir: &AddrSpace, rpdir: &mut AddrSpace, va: usize, size: usize) {
    remove(rpdir, va, size);
    copy(pdir, va, rpdir, va, size);
}

pub const USER_RANGE: (usize, usize) = (USERLO, USERHI - USERLO);

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_mapped(va: usize) -> AddrSpace {
        let mut a = AddrSpace::empty();
        assert!(setperm(&mut a, va, PGSIZE, true));
        a
    }

    #[test]
    fn copy_onto_an_already_mapped_destination_does_not_leak_the_old_frame() {
        palloc::init();
        let src = fresh_mapped(USERLO);
        let mut dst = fresh_mapped(USERLO);
        let old_frame = dst.mapping(USERLO).unwrap().frame;
        assert!(palloc::frames().is_allocated(old_frame));

        copy(&src, USERLO, &mut dst, USERLO, PGSIZE);

        // The old destination frame had no other owner, so overwriting
        // its mapping without a decref would otherwise strand it: not
        // on the freelist, not reachable from any address space.
        assert!(!palloc::frames().is_allocated(old_frame));
        let new_frame = dst.mapping(USERLO).unwrap().frame;
        assert_eq!(palloc::frames().refcount(new_frame), 2);
    }

    #[test]
    fn merge_onto_a_diverged_already_mapped_destination_does_not_leak_the_old_frame() {
        palloc::init();
        let base = fresh_mapped(USERLO);
        let local = fresh_mapped(USERLO); // diverged: different frame than base
        let mut dst = fresh_mapped(USERLO);
        let old_frame = dst.mapping(USERLO).unwrap().frame;
        assert!(palloc::frames().is_allocated(old_frame));

        merge(&base, &local, USERLO, &mut dst, USERLO, PGSIZE);

        assert!(!palloc::frames().is_allocated(old_frame));
        assert_eq!(dst.mapping(USERLO).unwrap().frame, local.mapping(USERLO).unwrap().frame);
    }
}
