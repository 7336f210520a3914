//! `PointMemoryPool`: a slab allocator for `Point`s with a free-list and an
//! occupancy bitset.
//!
//! The original implementation kept slot addresses stable via aligned storage
//! and placement-new. Rust has no placement-new; instead the slab is modeled
//! as `Box<[MaybeUninit<Point>]>` plus a `bitvec`-free occupancy array and a
//! free-list of slot indices. Clients hold a `u32` slot index rather than a
//! pointer, which gives the same stable identity for the Point's lifetime
//! while the borrow checker enforces that no index outlives a `clear()`.

use crate::point::{Point, PointId};
use parking_lot::Mutex;
use std::mem::MaybeUninit;

/// A slot index into a `PointMemoryPool`. Stable until the owning slot is
/// deallocated or the pool is cleared.
pub type SlotIndex = u32;

struct Slots {
    slots: Box<[MaybeUninit<Point>]>,
    occupied: Box<[bool]>,
    free_list: Vec<SlotIndex>,
    bump: usize,
    total_allocated: usize,
}

/// Slab allocator of fixed-capacity `Point` slots.
///
/// All mutating operations (and the `all_points` snapshot) are serialized by
/// a single mutex: the pool is the granularity of contention, not individual
/// slots.
pub struct PointMemoryPool {
    capacity: usize,
    inner: Mutex<Slots>,
}

impl PointMemoryPool {
    /// Creates an empty pool with room for `capacity` points.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| MaybeUninit::uninit())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            capacity,
            inner: Mutex::new(Slots {
                slots,
                occupied: vec![false; capacity].into_boxed_slice(),
                free_list: Vec::new(),
                bump: 0,
                total_allocated: 0,
            }),
        }
    }

    /// Returns the pool's fixed capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Allocates a slot for a new `Point` with the given id, constructing it
    /// in place. Returns `None` if the pool is full.
    ///
    /// Picks a slot from the free-list first; only advances the bump pointer
    /// once the free-list is empty.
    pub fn allocate(&self, id: PointId) -> Option<SlotIndex> {
        let mut inner = self.inner.lock();
        if inner.total_allocated >= self.capacity {
            return None;
        }

        let idx = if let Some(idx) = inner.free_list.pop() {
            idx
        } else {
            let idx = inner.bump as SlotIndex;
            inner.bump += 1;
            idx
        };

        inner.slots[idx as usize] = MaybeUninit::new(Point::new(id));
        inner.occupied[idx as usize] = true;
        inner.total_allocated += 1;
        Some(idx)
    }

    /// Applies `f` to the point at `idx`, if the slot is currently occupied.
    pub fn with_point<R>(&self, idx: SlotIndex, f: impl FnOnce(&mut Point) -> R) -> Option<R> {
        let mut inner = self.inner.lock();
        let i = idx as usize;
        if i >= self.capacity || !inner.occupied[i] {
            return None;
        }
        // SAFETY: `occupied[i]` is true, so this slot holds a live, initialized `Point`.
        let point = unsafe { inner.slots[i].assume_init_mut() };
        Some(f(point))
    }

    /// Destroys the point at `idx` in place and returns the slot to the
    /// free-list. A second deallocation of an already-free slot is a no-op.
    pub fn deallocate(&self, idx: SlotIndex) {
        let mut inner = self.inner.lock();
        let i = idx as usize;
        if i >= self.capacity || !inner.occupied[i] {
            return;
        }
        // SAFETY: occupied[i] is true, so the slot holds a live, initialized `Point`;
        // we now drop it and mark the slot free, matching placement-delete semantics.
        unsafe {
            inner.slots[i].assume_init_drop();
        }
        inner.occupied[i] = false;
        inner.free_list.push(idx);
        inner.total_allocated -= 1;
    }

    /// Returns true if `idx` currently names a live, occupied slot.
    #[must_use]
    pub fn contains(&self, idx: SlotIndex) -> bool {
        let inner = self.inner.lock();
        let i = idx as usize;
        i < self.capacity && inner.occupied[i]
    }

    /// Finds the slot currently holding a live point with the given id, via a
    /// linear scan of the occupancy bitset.
    #[must_use]
    pub fn find_slot(&self, id: &PointId) -> Option<SlotIndex> {
        let inner = self.inner.lock();
        (0..inner.bump).filter(|&i| inner.occupied[i]).find_map(|i| {
            // SAFETY: occupied[i] is true.
            let point = unsafe { inner.slots[i].assume_init_ref() };
            (&point.id == id).then_some(i as SlotIndex)
        })
    }

    /// Returns a snapshot clone of every live point, derived from the
    /// occupancy bitset (not the free-list).
    #[must_use]
    pub fn all_points(&self) -> Vec<(SlotIndex, Point)> {
        let inner = self.inner.lock();
        (0..inner.bump)
            .filter(|&i| inner.occupied[i])
            .map(|i| {
                // SAFETY: occupied[i] is true.
                let point = unsafe { inner.slots[i].assume_init_ref() };
                (i as SlotIndex, point.clone())
            })
            .collect()
    }

    /// Destroys all live points, empties the free-list, and resets the bump
    /// pointer: the pool is as if newly constructed.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for i in 0..inner.bump {
            if inner.occupied[i] {
                // SAFETY: occupied[i] is true.
                unsafe {
                    inner.slots[i].assume_init_drop();
                }
                inner.occupied[i] = false;
            }
        }
        inner.free_list.clear();
        inner.bump = 0;
        inner.total_allocated = 0;
    }

    /// Number of currently live points.
    #[must_use]
    pub fn total_allocated(&self) -> usize {
        self.inner.lock().total_allocated
    }

    /// Number of slots still available for allocation.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.capacity - self.total_allocated()
    }
}

impl Drop for PointMemoryPool {
    fn drop(&mut self) {
        self.clear();
    }
}

// SAFETY: access to the slab is serialized by the internal mutex; `Point` itself
// contains no thread-unsafe interior mutability.
unsafe impl Send for PointMemoryPool {}
unsafe impl Sync for PointMemoryPool {}
