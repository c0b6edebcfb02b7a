//! Bump-pointer arena with O(1) allocation and explicit reset.
//!
//! # Scope
//! The arena serves pipeline stages whose allocations share one lifetime
//! (per-request, per-tick): each `allocate` is an align + add + compare, and
//! the whole region is reclaimed with a single `reset`. There is no
//! per-object free.
//!
//! # Invariants
//! - `used <= capacity` at all times.
//! - Pointers handed out never overlap and stay inside
//!   `[begin, begin + capacity)`.
//! - `reset` runs no destructors; dropping objects constructed inside the
//!   arena is the caller's contract.
//!
//! # Failure modes
//! - Exhaustion returns `None`; it is an expected outcome, not an error.
//! - Construction reports `InvalidLayout` / `OutOfMemory` via
//!   [`AllocInitError`].

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

use super::AllocInitError;
use crate::platform::HugePageRegion;

/// Minimum alignment of owned arena backings. Page alignment keeps the base
/// address predictable so any element alignment up to 4 KiB holds for free.
const BACKING_ALIGN: usize = 4096;

enum Backing {
    /// Heap allocation owned by the arena.
    Heap { layout: Layout },
    /// Anonymous mapping owned by the arena (kept alive, freed on drop).
    Huge(#[allow(dead_code)] HugePageRegion),
    /// Caller-provided bytes; the arena never frees them.
    Borrowed,
}

/// Bump allocator over one contiguous byte region.
///
/// Not thread-safe; share behind external synchronization or give each
/// worker its own arena.
pub struct Arena {
    begin: NonNull<u8>,
    capacity: usize,
    used: usize,
    backing: Backing,
}

// SAFETY: the arena owns (or exclusively borrows) its region; moving it
// between threads moves the whole region with it.
unsafe impl Send for Arena {}

impl Arena {
    /// Allocates an owning arena of `capacity_bytes` on the heap.
    pub fn new(capacity_bytes: usize) -> Result<Arena, AllocInitError> {
        if capacity_bytes == 0 {
            return Ok(Arena {
                begin: NonNull::dangling(),
                capacity: 0,
                used: 0,
                backing: Backing::Borrowed,
            });
        }

        let layout = Layout::from_size_align(capacity_bytes, BACKING_ALIGN)
            .map_err(|_| AllocInitError::InvalidLayout)?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc(layout) };
        let begin = NonNull::new(raw).ok_or(AllocInitError::OutOfMemory)?;

        Ok(Arena {
            begin,
            capacity: capacity_bytes,
            used: 0,
            backing: Backing::Heap { layout },
        })
    }

    /// Allocates an arena backed by an anonymous mapping, huge pages when
    /// the system provides them. The usable capacity is the full mapped
    /// length (the request rounded up to the page granule).
    pub fn with_huge_pages(capacity_bytes: usize) -> std::io::Result<Arena> {
        let region = HugePageRegion::allocate(capacity_bytes)?;
        let begin =
            NonNull::new(region.as_ptr()).expect("anonymous mapping has a non-null base");
        let capacity = region.len();
        Ok(Arena {
            begin,
            capacity,
            used: 0,
            backing: Backing::Huge(region),
        })
    }

    /// Builds a non-owning arena over caller-provided bytes.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `capacity_bytes` bytes for
    /// the whole lifetime of the arena, and nothing else may use the range
    /// while the arena is alive.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, capacity_bytes: usize) -> Arena {
        Arena {
            begin: ptr,
            capacity: capacity_bytes,
            used: 0,
            backing: Backing::Borrowed,
        }
    }

    /// Bumps the cursor to the next `align` boundary and carves out `bytes`.
    ///
    /// Returns `None` iff the aligned allocation would pass the end of the
    /// region. `allocate(0, a)` returns the aligned cursor when it is still
    /// in bounds. `align` must be a power of two (debug-asserted; a
    /// non-power-of-two is a contract violation).
    #[inline]
    pub fn allocate(&mut self, bytes: usize, align: usize) -> Option<NonNull<u8>> {
        debug_assert!(align.is_power_of_two(), "alignment must be a power of two");

        let base = self.begin.as_ptr() as usize;
        let cursor = base.checked_add(self.used)?;
        let aligned = cursor.checked_add(align - 1)? & !(align - 1);
        let end = aligned.checked_add(bytes)?;
        if end > base + self.capacity {
            return None;
        }

        self.used = end - base;
        // SAFETY: the offset stays within the region (or one-past-end for
        // zero-sized requests), so the pointer derives from begin and is
        // non-null.
        Some(unsafe { NonNull::new_unchecked(self.begin.as_ptr().add(aligned - base)) })
    }

    /// Rewinds the cursor to the start of the region.
    ///
    /// No destructors run; objects previously constructed in the arena must
    /// be dropped by the caller first if they need it.
    #[inline]
    pub fn reset(&mut self) {
        self.used = 0;
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes consumed so far, including alignment padding.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes left before exhaustion (ignoring future alignment padding).
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }

    /// Base address of the region.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.begin.as_ptr()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if let Backing::Heap { layout } = self.backing {
            // SAFETY: begin came from alloc(layout) and is freed exactly once.
            unsafe { dealloc(self.begin.as_ptr(), layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_aligned_and_disjoint() {
        let mut arena = Arena::new(1024).unwrap();

        let p1 = arena.allocate(3, 1).unwrap();
        let p2 = arena.allocate(4, 8).unwrap();

        assert_eq!(p2.as_ptr() as usize % 8, 0);
        assert!(p2.as_ptr() as usize >= p1.as_ptr() as usize + 3);

        arena.reset();
        assert_eq!(arena.used(), 0);
        assert!(arena.allocate(1024, 1).is_some());
    }

    #[test]
    fn exhaustion_returns_none_and_leaves_state_intact() {
        let mut arena = Arena::new(64).unwrap();
        assert!(arena.allocate(64, 1).is_some());
        let used = arena.used();
        assert!(arena.allocate(1, 1).is_none());
        assert_eq!(arena.used(), used);
    }

    #[test]
    fn alignment_padding_counts_toward_exhaustion() {
        let mut arena = Arena::new(64).unwrap();
        assert!(arena.allocate(1, 1).is_some());
        // Cursor is at offset 1; aligning to 64 consumes the rest.
        assert!(arena.allocate(1, 64).is_none());
    }

    #[test]
    fn zero_byte_allocation_returns_aligned_cursor() {
        let mut arena = Arena::new(16).unwrap();
        let p = arena.allocate(0, 8).unwrap();
        assert_eq!(p.as_ptr() as usize % 8, 0);
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn borrowed_backing_is_not_freed() {
        let mut buf = vec![0u8; 256];
        let ptr = NonNull::new(buf.as_mut_ptr()).unwrap();
        {
            // SAFETY: buf outlives the arena and is not touched while it lives.
            let mut arena = unsafe { Arena::from_raw_parts(ptr, buf.len()) };
            let p = arena.allocate(16, 1).unwrap();
            // SAFETY: p points into buf.
            unsafe { p.as_ptr().write(42) };
        }
        assert_eq!(buf[0], 42);
    }

    #[test]
    fn huge_page_backing_allocates() {
        let mut arena = Arena::with_huge_pages(8192).unwrap();
        assert!(arena.capacity() >= 8192);
        let p = arena.allocate(4096, 64).unwrap();
        // SAFETY: p points at 4096 writable bytes inside the mapping.
        unsafe { p.as_ptr().write_bytes(0xFF, 4096) };
    }

    #[test]
    fn zero_capacity_arena_is_inert() {
        let mut arena = Arena::new(0).unwrap();
        assert_eq!(arena.capacity(), 0);
        assert!(arena.allocate(1, 1).is_none());
        assert!(arena.allocate(0, 1).is_some());
    }
}
