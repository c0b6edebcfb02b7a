//! Fixed-size object pool with an intrusive free list.
//!
//! Free blocks store the next-link inside their own first bytes, so the pool
//! needs no side table: `allocate` pops the head, `deallocate` pushes back,
//! both O(1). There is no reference counting and no validation: returning a
//! foreign pointer or the same block twice corrupts the list (documented UB,
//! detection is out of contract).

use std::alloc::{alloc, dealloc, Layout};
use std::mem;
use std::ptr::NonNull;

use super::AllocInitError;

/// Link stored inside each free block.
struct FreeLink {
    next: Option<NonNull<FreeLink>>,
}

const LINK_SIZE: usize = mem::size_of::<FreeLink>();
const LINK_ALIGN: usize = mem::align_of::<FreeLink>();

enum Backing {
    Heap { layout: Layout },
    Borrowed,
}

/// Pool of `capacity` equally sized blocks carved from one contiguous buffer.
///
/// Not thread-safe; share behind external synchronization.
pub struct FixedPool {
    storage: NonNull<u8>,
    block_size: usize,
    capacity: usize,
    free_head: Option<NonNull<FreeLink>>,
    backing: Backing,
}

// SAFETY: the pool owns (or exclusively borrows) its buffer; handing the
// whole pool to another thread is sound.
unsafe impl Send for FixedPool {}

impl FixedPool {
    /// Actual bytes occupied by one block for a requested `element_size`:
    /// at least the free-list link, rounded so every block start stays
    /// link-aligned.
    #[inline]
    pub fn block_size_for(element_size: usize) -> usize {
        element_size.max(LINK_SIZE).next_multiple_of(LINK_ALIGN)
    }

    /// Creates a pool owning storage for `element_count` blocks of at least
    /// `element_size` bytes each.
    pub fn new(element_size: usize, element_count: usize) -> Result<FixedPool, AllocInitError> {
        let block_size = Self::block_size_for(element_size);

        if element_count == 0 {
            return Ok(FixedPool {
                storage: NonNull::dangling(),
                block_size,
                capacity: 0,
                free_head: None,
                backing: Backing::Borrowed,
            });
        }

        let size = block_size
            .checked_mul(element_count)
            .ok_or(AllocInitError::InvalidLayout)?;
        let layout = Layout::from_size_align(size, LINK_ALIGN.max(16))
            .map_err(|_| AllocInitError::InvalidLayout)?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc(layout) };
        let storage = NonNull::new(raw).ok_or(AllocInitError::OutOfMemory)?;

        let mut pool = FixedPool {
            storage,
            block_size,
            capacity: element_count,
            free_head: None,
            backing: Backing::Heap { layout },
        };
        // SAFETY: the buffer spans block_size * element_count writable bytes.
        unsafe { pool.thread_free_list() };
        Ok(pool)
    }

    /// Builds a pool over caller-provided bytes (no second allocation).
    ///
    /// The buffer must span `block_size_for(element_size) * element_count`
    /// bytes.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of that many bytes for the
    /// pool's lifetime, aligned to at least a pointer, and unused by anything
    /// else while the pool is alive.
    pub unsafe fn from_raw_parts(
        ptr: NonNull<u8>,
        element_size: usize,
        element_count: usize,
    ) -> FixedPool {
        debug_assert!(ptr.as_ptr() as usize % LINK_ALIGN == 0);

        let mut pool = FixedPool {
            storage: ptr,
            block_size: Self::block_size_for(element_size),
            capacity: element_count,
            free_head: None,
            backing: Backing::Borrowed,
        };
        if element_count > 0 {
            pool.thread_free_list();
        }
        pool
    }

    /// Threads every block onto the free list. The resulting order is an
    /// implementation detail, not part of the contract.
    ///
    /// # Safety
    /// The storage buffer must cover `block_size * capacity` writable bytes.
    unsafe fn thread_free_list(&mut self) {
        self.free_head = None;
        for i in 0..self.capacity {
            let block = self.storage.as_ptr().add(i * self.block_size).cast::<FreeLink>();
            block.write(FreeLink {
                next: self.free_head,
            });
            self.free_head = Some(NonNull::new_unchecked(block));
        }
    }

    /// Pops a free block. `None` iff the pool is exhausted.
    ///
    /// The returned bytes are uninitialized (they held the free-list link).
    #[inline]
    pub fn allocate(&mut self) -> Option<NonNull<u8>> {
        let head = self.free_head?;
        // SAFETY: every pointer on the free list points at a live block
        // holding a valid FreeLink.
        self.free_head = unsafe { head.as_ref().next };
        Some(head.cast())
    }

    /// Pushes a block back onto the free list.
    ///
    /// # Safety
    /// `ptr` must have been returned by `allocate` on this pool and must not
    /// currently be on the free list. Violations corrupt the list and are
    /// not detected.
    #[inline]
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        let link = ptr.cast::<FreeLink>();
        link.as_ptr().write(FreeLink {
            next: self.free_head,
        });
        self.free_head = Some(link);
    }

    /// Number of blocks the pool was created with.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes per block (requested element size rounded up for the link).
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

impl Drop for FixedPool {
    fn drop(&mut self) {
        if let Backing::Heap { layout } = self.backing {
            // SAFETY: storage came from alloc(layout) and is freed once.
            unsafe { dealloc(self.storage.as_ptr(), layout) };
        }
    }
}
