// Physical-frame allocator. Named as an external collaborator by
// spec.md §1 ("the physical-memory allocator" is out of scope as a
// *placement policy*), but `pmap`'s COPY/ZERO/SETPERM need something
// real to hand out frames from, so this is a minimal freelist
// allocator directly grounded on the teacher's `kalloc.rs`: a lock,
// a freelist, `kalloc`/`kfree`-shaped operations. The one deliberate
// difference is that frames are tracked as opaque indices into a
// static table rather than raw physical addresses, since this crate
// has no linker-provided physical memory to carve up.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::error::{KResult, KernelError};
use crate::param::NFRAME;
use crate::spinlock::Spinlock;
use crate::x86::PGSIZE;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct FrameId(u32);

struct Frame {
    data: Box<[u8; PGSIZE]>,
    refcount: u32,
}

pub struct FrameTable {
    lock: Spinlock,
    slots: Vec<Option<Frame>>,
    freelist: Vec<u32>,
}

impl FrameTable {
    fn new() -> Self {
        let mut freelist: Vec<u32> = (0..NFRAME as u32).collect();
        freelist.reverse(); // pop from the end, like kalloc's LIFO freelist
        let mut slots = Vec::with_capacity(NFRAME);
        slots.resize_with(NFRAME, || None);
        FrameTable {
            lock: Spinlock::init_lock("palloc"),
            slots,
            freelist,
        }
    }

    /// Allocate a single zero-filled frame. Returns `OutOfFrames` when
    /// the freelist is empty (spec.md §7 class 3: the caller panics,
    /// it does not retry or report this to user space).
    pub fn alloc_zeroed(&mut self) -> KResult<FrameId> {
        self.lock.acquire();
        let idx = self.freelist.pop();
        self.lock.release();
        let idx = idx.ok_or(KernelError::OutOfFrames)?;
        self.slots[idx as usize] = Some(Frame {
            data: Box::new([0u8; PGSIZE]),
            refcount: 1,
        });
        Ok(FrameId(idx))
    }

    pub fn incref(&mut self, id: FrameId) {
        let frame = self.slots[id.0 as usize]
            .as_mut()
            .expect("incref: frame not allocated");
        frame.refcount += 1;
    }

    /// Drop one reference; frees the frame back to the pool once the
    /// last reference is gone.
    pub fn decref(&mut self, id: FrameId) {
        let free = {
            let frame = self.slots[id.0 as usize]
                .as_mut()
                .expect("decref: frame not allocated");
            frame.refcount -= 1;
            frame.refcount == 0
        };
        if free {
            self.slots[id.0 as usize] = None;
            self.lock.acquire();
            self.freelist.push(id.0);
            self.lock.release();
        }
    }

    pub fn refcount(&self, id: FrameId) -> u32 {
        self.slots[id.0 as usize]
            .as_ref()
            .expect("refcount: frame not allocated")
            .refcount
    }

    /// Whether `id` still names a live frame, i.e. `decref` has not yet
    /// dropped its last reference and returned it to the freelist.
    /// Used by tests to confirm a superseded mapping was actually
    /// released rather than merely overwritten.
    pub fn is_allocated(&self, id: FrameId) -> bool {
        self.slots[id.0 as usize].is_some()
    }

    pub fn data(&self, id: FrameId) -> &[u8; PGSIZE] {
        &self.slots[id.0 as usize]
            .as_ref()
            .expect("data: frame not allocated")
            .data
    }

    pub fn data_mut(&mut self, id: FrameId) -> &mut [u8; PGSIZE] {
        &mut self.slots[id.0 as usize]
            .as_mut()
            .expect("data_mut: frame not allocated")
            .data
    }

    /// Make `id` safe to write without disturbing other owners of the
    /// same frame: if it is privately held already, return it as-is;
    /// otherwise allocate a private copy, following the share-map /
    /// copy-on-write discipline COPY establishes (spec.md §4.4 step 5).
    pub fn make_private(&mut self, id: FrameId) -> KResult<FrameId> {
        if self.refcount(id) == 1 {
            return Ok(id);
        }
        let new_id = self.alloc_zeroed()?;
        let contents = *self.data(id);
        *self.data_mut(new_id) = contents;
        self.decref(id);
        Ok(new_id)
    }
}

static mut FRAME_TABLE: Option<FrameTable> = None;

pub fn init() {
    unsafe {
        FRAME_TABLE = Some(FrameTable::new());
    }
}

pub fn frames() -> &'static mut FrameTable {
    unsafe {
        FRAME_TABLE
            .as_mut()
            .expect("palloc::init must run before first use")
    }
}
