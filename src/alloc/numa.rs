//! NUMA-aware compositions of the arena and the pool.
//!
//! These are thin layers: [`NumaArena`] is an [`Arena`] whose backing bytes
//! get a best-effort placement hint, and [`NumaPool`] lays a [`FixedPool`]
//! directly over a NUMA arena's memory. The pool's blocks are physical
//! slices of the arena, not a second allocation. On hosts without NUMA the
//! types behave exactly like their plain counterparts.

use std::io;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

use super::{AllocInitError, Arena, FixedPool};
use crate::platform::{bind_to_node, numa_available};

/// Arena with an advisory NUMA placement for its backing bytes.
pub struct NumaArena {
    arena: Arena,
    node: i32,
}

impl NumaArena {
    /// Builds a heap-backed arena and hints placement on `preferred_node`.
    ///
    /// A negative node, a host without NUMA, or a rejected hint all degrade
    /// to plain-arena behavior; only the first two are observable (via
    /// [`node`](Self::node) reporting `-1`).
    pub fn new(capacity_bytes: usize, preferred_node: i32) -> Result<NumaArena, AllocInitError> {
        let arena = Arena::new(capacity_bytes)?;
        Ok(Self::bound(arena, preferred_node))
    }

    /// Same composition over a huge-page backing.
    pub fn with_huge_pages(capacity_bytes: usize, preferred_node: i32) -> io::Result<NumaArena> {
        let arena = Arena::with_huge_pages(capacity_bytes)?;
        Ok(Self::bound(arena, preferred_node))
    }

    fn bound(arena: Arena, preferred_node: i32) -> NumaArena {
        let node = if preferred_node >= 0 && numa_available() && arena.capacity() > 0 {
            bind_to_node(arena.as_ptr(), arena.capacity(), preferred_node);
            preferred_node
        } else {
            -1
        };
        NumaArena { arena, node }
    }

    /// See [`Arena::allocate`].
    #[inline]
    pub fn allocate(&mut self, bytes: usize, align: usize) -> Option<NonNull<u8>> {
        self.arena.allocate(bytes, align)
    }

    /// See [`Arena::reset`].
    #[inline]
    pub fn reset(&mut self) {
        self.arena.reset()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.arena.used()
    }

    /// The node the backing bytes were hinted onto, or `-1` when no hint was
    /// requested or the platform has no NUMA API.
    #[inline]
    pub fn node(&self) -> i32 {
        self.node
    }

    /// The wrapped arena.
    #[inline]
    pub fn inner(&self) -> &Arena {
        &self.arena
    }

    #[inline]
    pub fn inner_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }
}

/// Fixed-size pool of `T` blocks carved out of a NUMA arena.
pub struct NumaPool<T> {
    // Declaration order matters: the pool borrows the arena's bytes and must
    // drop first.
    pool: FixedPool,
    arena: NumaArena,
    _marker: PhantomData<T>,
}

impl<T> NumaPool<T> {
    /// Builds a pool of `capacity` blocks placed on `preferred_node`.
    pub fn new(capacity: usize, preferred_node: i32) -> Result<NumaPool<T>, AllocInitError> {
        let block_size = FixedPool::block_size_for(mem::size_of::<T>());
        let total = block_size
            .checked_mul(capacity)
            .ok_or(AllocInitError::InvalidLayout)?;

        let mut arena = NumaArena::new(total, preferred_node)?;
        let pool = if capacity == 0 {
            // SAFETY: a zero-capacity pool never touches its storage.
            unsafe { FixedPool::from_raw_parts(NonNull::dangling(), mem::size_of::<T>(), 0) }
        } else {
            let align = mem::align_of::<T>().max(mem::align_of::<usize>());
            let base = arena
                .allocate(total, align)
                .expect("freshly built arena holds its own block span");
            // SAFETY: base spans `total` bytes owned by `arena`, which lives
            // (and stays untouched) as long as the pool does.
            unsafe { FixedPool::from_raw_parts(base, mem::size_of::<T>(), capacity) }
        };

        Ok(NumaPool {
            pool,
            arena,
            _marker: PhantomData,
        })
    }

    /// Pops a free block. `None` iff the pool is exhausted. The block is
    /// uninitialized storage for one `T`.
    #[inline]
    pub fn allocate(&mut self) -> Option<NonNull<T>> {
        self.pool.allocate().map(NonNull::cast)
    }

    /// Returns a block to the pool.
    ///
    /// # Safety
    /// `ptr` must come from [`allocate`](Self::allocate) on this pool, must
    /// not be returned twice, and any `T` constructed in it must already be
    /// dropped.
    #[inline]
    pub unsafe fn deallocate(&mut self, ptr: NonNull<T>) {
        self.pool.deallocate(ptr.cast())
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Placement node, `-1` when unbound.
    #[inline]
    pub fn node(&self) -> i32 {
        self.arena.node()
    }
}
