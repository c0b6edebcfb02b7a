//! Wait-free SPSC (single-producer, single-consumer) bounded ring buffer.
//!
//! # Design
//!
//! The classic two-index ring: the producer owns `tail`, the consumer owns
//! `head`, both are monotonically increasing 64-bit counters and only the
//! slot address is reduced modulo the (power-of-two) storage size. One slot
//! is kept as a gap so `tail == head` means empty and a distance of
//! `storage - 1` means full, without any shared occupancy counter.
//!
//! # Key properties
//!
//! - **Wait-free**: `try_push` and `try_pop` complete in bounded steps; no
//!   CAS anywhere, only acquire/release loads and stores (plain `MOV`s on
//!   x86-64 TSO).
//! - **Cached remote index**: the producer keeps a local copy of the
//!   consumer's `head` and only reloads it on apparent-full; the consumer
//!   mirrors this with `tail`. Most operations touch a single shared cache
//!   line instead of two.
//! - **Cache-line partitioned**: `head` and `tail` live in
//!   `CachePadded` so the two sides never false-share.
//! - **Capacity rounding**: a request for `C` rounds storage to
//!   `next_pow2(C + 1)`; the usable capacity `storage - 1` is reported by
//!   [`capacity`](SpscProducer::capacity).
//!
//! # Ordering rationale
//!
//! ```text
//! producer: write slot, Release-store tail   →  consumer: Acquire-load tail, read slot
//! consumer: read slot,  Release-store head   →  producer: Acquire-load head, write slot
//! ```
//!
//! Each direction establishes happens-before between the slot access and the
//! index publication that makes it visible; weakening either side is a
//! correctness bug, not a performance knob.
//!
//! # Concurrency model
//!
//! Exactly one producer thread and one consumer thread. The handles enforce
//! this statically: each operation takes `&mut self`, and a handle can be
//! moved to another thread but not shared.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicU64, Ordering};

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::Arc;

use crossbeam_utils::CachePadded;

/// Shared ring storage; producer and consumer handles both point here.
///
/// # Invariants
/// - `storage` length is a power of two ≥ 2; `mask = len - 1`;
///   `capacity = len - 1` (one slot is the empty/full gap).
/// - `head <= tail <= head + capacity` for the true index values.
/// - Slots in `[head, tail)` (addresses via `mask`) are initialized; all
///   others are uninitialized.
/// - Only the producer stores `tail`; only the consumer stores `head`.
struct SpscRing<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: u64,
    capacity: u64,

    /// Consumer's index. Advanced with Release by the consumer, read with
    /// Acquire by the producer to detect free space.
    head: CachePadded<AtomicU64>,

    /// Producer's index. Advanced with Release by the producer, read with
    /// Acquire by the consumer to detect available elements.
    tail: CachePadded<AtomicU64>,
}

// SAFETY: the SPSC protocol keeps producer and consumer on disjoint slots;
// the atomic indices carry the required happens-before edges.
unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    fn with_capacity(requested: usize) -> SpscRing<T> {
        let storage = requested
            .checked_add(1)
            .and_then(usize::checked_next_power_of_two)
            .expect("SPSC capacity overflow")
            .max(2);
        assert!(storage <= u64::MAX as usize / 2, "SPSC capacity too large");

        let slots = (0..storage)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        SpscRing {
            slots,
            mask: (storage - 1) as u64,
            capacity: (storage - 1) as u64,
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
        }
    }

    #[inline]
    fn slot(&self, idx: u64) -> *mut MaybeUninit<T> {
        self.slots[(idx & self.mask) as usize].get()
    }
}

impl<T> Drop for SpscRing<T> {
    fn drop(&mut self) {
        // Callers are expected to drain before teardown; anything left in
        // [head, tail) is still dropped so no value leaks.
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);

        let mut idx = head;
        while idx != tail {
            // SAFETY: slots in [head, tail) are initialized.
            unsafe { (*self.slot(idx)).assume_init_drop() };
            idx = idx.wrapping_add(1);
        }
    }
}

/// Bounded SPSC ring buffer; split into its two endpoint handles with
/// [`split`](SpscRingBuffer::split).
pub struct SpscRingBuffer<T> {
    ring: Arc<SpscRing<T>>,
}

impl<T> SpscRingBuffer<T> {
    /// Creates a ring with usable capacity `next_pow2(requested + 1) - 1`
    /// (at least 1; a request of 0 or 1 still yields a working queue).
    pub fn with_capacity(requested: usize) -> SpscRingBuffer<T> {
        SpscRingBuffer {
            ring: Arc::new(SpscRing::with_capacity(requested)),
        }
    }

    /// Usable capacity after rounding.
    pub fn capacity(&self) -> usize {
        self.ring.capacity as usize
    }

    /// Consumes the ring and returns the producer and consumer endpoints.
    ///
    /// Each endpoint may be moved to its own thread; the storage is freed
    /// when both have been dropped.
    pub fn split(self) -> (SpscProducer<T>, SpscConsumer<T>) {
        let producer = SpscProducer {
            ring: Arc::clone(&self.ring),
            cached_head: 0,
        };
        let consumer = SpscConsumer {
            ring: self.ring,
            cached_tail: 0,
        };
        (producer, consumer)
    }
}

// ============================================================================
// Producer
// ============================================================================

/// Producer endpoint: the only handle allowed to push.
///
/// Keeps a cached snapshot of the consumer's `head`, refreshed only when the
/// ring looks full, so the steady-state push path does not touch the
/// consumer's cache line.
pub struct SpscProducer<T> {
    ring: Arc<SpscRing<T>>,
    cached_head: u64,
}

impl<T> SpscProducer<T> {
    /// Attempts to push `value`; returns it back in `Err` when the ring is
    /// full.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        let ring = &*self.ring;
        let tail = ring.tail.load(Ordering::Relaxed);

        if tail.wrapping_sub(self.cached_head) >= ring.capacity {
            self.cached_head = ring.head.load(Ordering::Acquire);
            if tail.wrapping_sub(self.cached_head) >= ring.capacity {
                return Err(value);
            }
        }

        // SAFETY: the slot at `tail` is outside [head, tail) for every head
        // the consumer can currently hold, so nothing reads it until the
        // Release store below publishes it.
        unsafe { (*ring.slot(tail)).write(value) };

        ring.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Pushes as many leading elements of `src` as fit, cloning them.
    ///
    /// Returns the number pushed (0..=src.len()). The batch is not atomic:
    /// the consumer may observe a prefix. A single Release store publishes
    /// the whole batch.
    pub fn try_push_batch(&mut self, src: &[T]) -> usize
    where
        T: Clone,
    {
        if src.is_empty() {
            return 0;
        }
        let ring = &*self.ring;
        let tail = ring.tail.load(Ordering::Relaxed);

        // A batch is worth a fresh look at the consumer's progress.
        self.cached_head = ring.head.load(Ordering::Acquire);
        let free = ring.capacity.wrapping_sub(tail.wrapping_sub(self.cached_head)) as usize;
        let count = free.min(src.len());
        if count == 0 {
            return 0;
        }

        for (i, value) in src[..count].iter().enumerate() {
            // SAFETY: all slots in [tail, tail + count) are free; see try_push.
            unsafe { (*ring.slot(tail.wrapping_add(i as u64))).write(value.clone()) };
        }

        ring.tail
            .store(tail.wrapping_add(count as u64), Ordering::Release);
        count
    }

    /// Borrows the next writable slot without publishing it.
    ///
    /// Returns `None` when the ring is full. After writing the slot, publish
    /// it with [`commit_producer_slot`](Self::commit_producer_slot); no other
    /// producer-side operation may happen in between.
    #[inline]
    pub fn try_acquire_producer_slot(&mut self) -> Option<&mut MaybeUninit<T>> {
        let ring = &*self.ring;
        let tail = ring.tail.load(Ordering::Relaxed);

        if tail.wrapping_sub(self.cached_head) >= ring.capacity {
            self.cached_head = ring.head.load(Ordering::Acquire);
            if tail.wrapping_sub(self.cached_head) >= ring.capacity {
                return None;
            }
        }

        // SAFETY: the slot is unpublished and unreachable by the consumer;
        // &mut self keeps the producer side exclusive.
        Some(unsafe { &mut *ring.slot(tail) })
    }

    /// Publishes the slot handed out by the last
    /// [`try_acquire_producer_slot`](Self::try_acquire_producer_slot).
    ///
    /// # Safety
    /// The caller must have fully initialized that slot, and no other
    /// producer-side operation may have run since acquiring it. Committing a
    /// slot that was never acquired publishes uninitialized memory.
    #[inline]
    pub unsafe fn commit_producer_slot(&mut self) {
        let ring = &*self.ring;
        let tail = ring.tail.load(Ordering::Relaxed);
        ring.tail.store(tail.wrapping_add(1), Ordering::Release);
    }

    /// Usable capacity of the ring.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity as usize
    }

    /// Advisory occupancy from the producer's perspective.
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.ring.tail.load(Ordering::Relaxed);
        let head = self.ring.head.load(Ordering::Relaxed);
        tail.wrapping_sub(head) as usize
    }

    /// Advisory emptiness check.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Consumer endpoint: the only handle allowed to pop.
///
/// Mirrors the producer's caching: the producer's `tail` is only reloaded
/// when the ring looks empty.
pub struct SpscConsumer<T> {
    ring: Arc<SpscRing<T>>,
    cached_tail: u64,
}

impl<T> SpscConsumer<T> {
    /// Attempts to pop the oldest element; `None` when the ring is empty.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        let ring = &*self.ring;
        let head = ring.head.load(Ordering::Relaxed);

        if head == self.cached_tail {
            self.cached_tail = ring.tail.load(Ordering::Acquire);
            if head == self.cached_tail {
                return None;
            }
        }

        // SAFETY: head < tail, so the slot is initialized and the producer
        // will not touch it until the Release store below frees it.
        let value = unsafe { (*ring.slot(head)).assume_init_read() };

        ring.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Pops up to `out.len()` elements; returns how many were written into
    /// `out[..n]`. A single Release store frees the whole batch.
    pub fn try_pop_batch(&mut self, out: &mut [MaybeUninit<T>]) -> usize {
        if out.is_empty() {
            return 0;
        }
        let ring = &*self.ring;
        let head = ring.head.load(Ordering::Relaxed);

        // Draining: always look at the freshest tail.
        self.cached_tail = ring.tail.load(Ordering::Acquire);
        let available = self.cached_tail.wrapping_sub(head) as usize;
        if available == 0 {
            return 0;
        }

        let count = available.min(out.len());
        for (i, slot_out) in out[..count].iter_mut().enumerate() {
            // SAFETY: slots in [head, head + count) are initialized.
            *slot_out =
                MaybeUninit::new(unsafe { (*ring.slot(head.wrapping_add(i as u64))).assume_init_read() });
        }

        ring.head
            .store(head.wrapping_add(count as u64), Ordering::Release);
        count
    }

    /// Borrows the oldest element in place without consuming it.
    ///
    /// Returns `None` when the ring is empty. Release the slot (dropping the
    /// element) with [`release_consumer_slot`](Self::release_consumer_slot);
    /// no other consumer-side operation may happen in between.
    #[inline]
    pub fn try_acquire_consumer_slot(&mut self) -> Option<&T> {
        let ring = &*self.ring;
        let head = ring.head.load(Ordering::Relaxed);

        if head == self.cached_tail {
            self.cached_tail = ring.tail.load(Ordering::Acquire);
            if head == self.cached_tail {
                return None;
            }
        }

        // SAFETY: the slot is initialized and the producer cannot reclaim it
        // before head advances.
        Some(unsafe { (*ring.slot(head)).assume_init_ref() })
    }

    /// Drops the element handed out by the last
    /// [`try_acquire_consumer_slot`](Self::try_acquire_consumer_slot) and
    /// frees its slot.
    ///
    /// # Safety
    /// Must follow a successful acquire with no consumer-side operation in
    /// between; releasing an unacquired slot drops uninitialized memory.
    #[inline]
    pub unsafe fn release_consumer_slot(&mut self) {
        let ring = &*self.ring;
        let head = ring.head.load(Ordering::Relaxed);
        (*ring.slot(head)).assume_init_drop();
        ring.head.store(head.wrapping_add(1), Ordering::Release);
    }

    /// Usable capacity of the ring.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity as usize
    }

    /// Advisory occupancy from the consumer's perspective.
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.ring.tail.load(Ordering::Relaxed);
        let head = self.ring.head.load(Ordering::Relaxed);
        tail.wrapping_sub(head) as usize
    }

    /// Advisory emptiness check.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tests
// ============================================================================


// ============================================================================
// Loom Tests
// ============================================================================
