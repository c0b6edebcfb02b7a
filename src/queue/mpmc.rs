//! Lock-free MPMC (multi-producer, multi-consumer) bounded ring buffer.
//!
//! # Design
//!
//! Vyukov-style slot sequencing. Every slot carries a monotonically
//! increasing sequence counter initialized to its own index. A producer that
//! wants index `t` checks `seq == t` (slot empty for this cycle), claims the
//! index with a CAS on `tail`, writes the element, and publishes
//! `seq = t + 1`. A consumer expecting index `h` checks `seq == h + 1`,
//! claims `h` via CAS on `head`, reads the element, and releases the slot
//! for the next lap with `seq = h + capacity`. The sequence encodes both
//! phase and lap, so a slot reused many times can never be confused with an
//! older cycle. The classic ABA hazard is structurally absent, without
//! tagged pointers.
//!
//! # Memory ordering
//!
//! Every `seq` load that gates data access is Acquire and every publishing
//! `seq` store is Release; that pair carries the happens-before edge between
//! writer and reader of the element bytes. The index CASes are Relaxed on
//! both outcomes: they only arbitrate which thread owns an index, and the
//! sequence protocol already orders the data. This split is part of the
//! contract, not an optimization.
//!
//! # Progress
//!
//! Lock-free but not wait-free: a producer or consumer can retry while
//! others succeed. `is_full`/`is_empty`/`approximate_len` use relaxed loads
//! and are advisory only; `is_full` in particular can report a false
//! negative under contention.

#[cfg(not(loom))]
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicU64, Ordering};

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

use crossbeam_utils::CachePadded;

/// One ring slot: the sequence counter on its own cache line, followed by
/// storage for the element.
struct Slot<T> {
    /// Slot phase; see the module docs for the encoding.
    sequence: CachePadded<AtomicU64>,
    storage: UnsafeCell<MaybeUninit<T>>,
}

/// Bounded MPMC queue. All operations take `&self`; any number of threads
/// may push and pop concurrently.
pub struct MpmcRingBuffer<T> {
    slots: Box<[Slot<T>]>,
    mask: u64,
    capacity: u64,

    /// Consumer claim index.
    head: CachePadded<AtomicU64>,
    /// Producer claim index.
    tail: CachePadded<AtomicU64>,
}

// SAFETY: slot ownership is arbitrated by the sequence protocol; an element
// is only ever written by the claiming producer and read by the claiming
// consumer, with release/acquire edges between them.
unsafe impl<T: Send> Send for MpmcRingBuffer<T> {}
unsafe impl<T: Send> Sync for MpmcRingBuffer<T> {}

impl<T> MpmcRingBuffer<T> {
    /// Creates a queue with capacity `next_pow2(requested)`, minimum 2.
    pub fn with_capacity(requested: usize) -> MpmcRingBuffer<T> {
        let capacity = requested
            .checked_next_power_of_two()
            .expect("MPMC capacity overflow")
            .max(2);
        assert!(capacity <= u64::MAX as usize / 2, "MPMC capacity too large");

        let slots = (0..capacity as u64)
            .map(|i| Slot {
                sequence: CachePadded::new(AtomicU64::new(i)),
                storage: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        MpmcRingBuffer {
            slots,
            mask: (capacity - 1) as u64,
            capacity: capacity as u64,
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
        }
    }

    #[inline]
    fn slot(&self, idx: u64) -> &Slot<T> {
        &self.slots[(idx & self.mask) as usize]
    }

    /// Attempts to move `value` into the queue; returns it back in `Err`
    /// when the queue is full.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let mut tail = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = self.slot(tail);
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(tail) as i64;

            if diff == 0 {
                // Slot is empty for this lap; try to claim the index.
                match self.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS made this thread the unique owner
                        // of index `tail`; the slot is empty until the
                        // Release below publishes it.
                        unsafe { (*slot.storage.get()).write(value) };
                        slot.sequence
                            .store(tail.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => tail = current,
                }
            } else if diff < 0 {
                // Sequence lags the tail: the slot still holds last lap's
                // element, so the queue is full.
                return Err(value);
            } else {
                // Another producer already claimed this index.
                tail = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Attempts to pop the oldest element; `None` when the queue is empty.
    pub fn try_pop(&self) -> Option<T> {
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            let slot = self.slot(head);
            let seq = slot.sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(head.wrapping_add(1)) as i64;

            if diff == 0 {
                match self.head.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS made this thread the unique owner
                        // of index `head` and the Acquire above saw the
                        // producer's publication.
                        let value = unsafe { (*slot.storage.get()).assume_init_read() };
                        // Free the slot for the producer one lap ahead.
                        slot.sequence
                            .store(head.wrapping_add(self.capacity), Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => head = current,
                }
            } else if diff < 0 {
                return None;
            } else {
                head = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Pushes leading elements of `src` until full; returns the count.
    /// Not atomic; consumers may interleave.
    pub fn try_push_batch(&self, src: &[T]) -> usize
    where
        T: Clone,
    {
        let mut pushed = 0;
        for value in src {
            if self.try_push(value.clone()).is_err() {
                break;
            }
            pushed += 1;
        }
        pushed
    }

    /// Pops up to `out.len()` elements into `out[..n]`; returns `n`.
    pub fn try_pop_batch(&self, out: &mut [MaybeUninit<T>]) -> usize {
        let mut popped = 0;
        for slot_out in out.iter_mut() {
            match self.try_pop() {
                Some(v) => {
                    *slot_out = MaybeUninit::new(v);
                    popped += 1;
                }
                None => break,
            }
        }
        popped
    }

    /// Capacity after power-of-two rounding.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Advisory emptiness check (relaxed).
    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        head == tail
    }

    /// Advisory fullness check; may report false negatives under contention.
    pub fn is_full(&self) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let seq = self.slot(tail).sequence.load(Ordering::Acquire);
        (seq.wrapping_sub(tail) as i64) < 0
    }

    /// Advisory element count (relaxed; transient values can be off).
    pub fn approximate_len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        (tail.wrapping_sub(head) as i64).max(0) as usize
    }
}

impl<T> Drop for MpmcRingBuffer<T> {
    fn drop(&mut self) {
        // Callers drain before teardown by contract; anything left is
        // dropped here so values cannot leak.
        while self.try_pop().is_some() {}
    }
}

// ============================================================================
// Tests
// ============================================================================


// ============================================================================
// Loom Tests
// ============================================================================
