//! SPSC ring materialized over a shared-memory region.
//!
//! # Wire layout
//!
//! The region is a fixed little-endian layout both processes agree on out of
//! band (no magic number, no version field):
//!
//! ```text
//! offset  0   u64 capacity   (slot count, used as-is, NOT rounded)
//! offset  8   u64 head       (consumer index)
//! offset 16   u64 tail       (producer index)
//! offset 24   T[capacity]    (slots)
//! ```
//!
//! Indices are slot counts that wrap with `(i + 1) % capacity`; the ring is
//! full when `(tail + 1) % capacity == head`, so one slot stays empty as the
//! full/empty gap and the usable capacity is `capacity - 1`.
//!
//! `head` and `tail` are accessed as `AtomicU64` with the same
//! acquire/release pairing as the in-process SPSC ring. `AtomicU64` has the
//! same layout as `u64`, so the wire contract above is unchanged; a peer
//! written against the plain-integer reading of the layout sees identical
//! bytes.
//!
//! # Contract
//!
//! Exactly one producer process and one consumer process, cooperating.
//! Element types must be `Copy` (raw bytes are what crosses the boundary;
//! nothing with a destructor or pointers survives an address-space change).

use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(unix)]
use crate::platform::ShmRegion;

/// Region header. `repr(C)` pins the three fields at offsets 0/8/16.
#[repr(C)]
struct ShmRingHeader {
    capacity: u64,
    head: AtomicU64,
    tail: AtomicU64,
}

const HEADER_SIZE: usize = mem::size_of::<ShmRingHeader>();

const _: () = assert!(HEADER_SIZE == 24, "header must stay packed to 8 bytes");

/// One endpoint's view of a shared-memory SPSC ring.
///
/// The view borrows the mapped region; each process builds its own from its
/// own mapping of the same named segment.
pub struct ShmSpscRing<'r, T> {
    header: &'r ShmRingHeader,
    slots: *mut T,
    capacity: u64,
    _marker: PhantomData<&'r mut [T]>,
}

impl<'r, T: Copy> ShmSpscRing<'r, T> {
    /// Bytes a region must span for `capacity` slots of `T`.
    pub const fn region_size(capacity: usize) -> usize {
        HEADER_SIZE + capacity * mem::size_of::<T>()
    }

    /// Initializes a fresh ring in the region: writes the header
    /// (`head = tail = 0`) and treats the following bytes as slots.
    ///
    /// # Panics
    /// If `capacity < 2`, the region is too small, `ptr` is not 8-aligned,
    /// or `align_of::<T>() > 8` (the slot array starts at offset 24).
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` bytes for `'r`, and
    /// no other view of the region may be live in this process. The peer
    /// process must follow the one-producer/one-consumer contract.
    pub unsafe fn create(ptr: NonNull<u8>, len: usize, capacity: u64) -> ShmSpscRing<'r, T> {
        assert!(capacity >= 2, "capacity must leave room for the gap slot");
        assert!(len >= Self::region_size(capacity as usize), "region too small");
        Self::check_layout(ptr);

        let header = ptr.as_ptr().cast::<ShmRingHeader>();
        header.write(ShmRingHeader {
            capacity,
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
        });

        Self::view(ptr, capacity)
    }

    /// Attaches to a ring some peer already initialized; the header is
    /// trusted, validated only against `len`.
    ///
    /// # Safety
    /// As for [`create`](Self::create), plus: the header at `ptr` must have
    /// been written by `create` with this same `T`.
    pub unsafe fn attach(ptr: NonNull<u8>, len: usize) -> ShmSpscRing<'r, T> {
        assert!(len >= HEADER_SIZE, "region too small for header");
        Self::check_layout(ptr);

        let capacity = (*ptr.as_ptr().cast::<ShmRingHeader>()).capacity;
        assert!(capacity >= 2, "attached header has degenerate capacity");
        assert!(len >= Self::region_size(capacity as usize), "region too small");

        Self::view(ptr, capacity)
    }

    /// [`create`](Self::create) over a mapped [`ShmRegion`].
    ///
    /// # Safety
    /// The peer process must follow the one-producer/one-consumer contract
    /// and must not attach before creation completes.
    #[cfg(unix)]
    pub unsafe fn create_in(region: &'r ShmRegion, capacity: u64) -> ShmSpscRing<'r, T> {
        let ptr = NonNull::new(region.as_ptr()).expect("mapped region has a non-null base");
        Self::create(ptr, region.len(), capacity)
    }

    /// [`attach`](Self::attach) over a mapped [`ShmRegion`].
    ///
    /// # Safety
    /// As for [`create_in`](Self::create_in); the creator must have
    /// initialized the header first.
    #[cfg(unix)]
    pub unsafe fn attach_to(region: &'r ShmRegion) -> ShmSpscRing<'r, T> {
        let ptr = NonNull::new(region.as_ptr()).expect("mapped region has a non-null base");
        Self::attach(ptr, region.len())
    }

    fn check_layout(ptr: NonNull<u8>) {
        assert!(ptr.as_ptr() as usize % 8 == 0, "region must be 8-aligned");
        assert!(
            mem::align_of::<T>() <= 8,
            "slot type alignment exceeds the header stride"
        );
    }

    unsafe fn view(ptr: NonNull<u8>, capacity: u64) -> ShmSpscRing<'r, T> {
        ShmSpscRing {
            header: &*ptr.as_ptr().cast::<ShmRingHeader>(),
            slots: ptr.as_ptr().add(HEADER_SIZE).cast::<T>(),
            capacity,
            _marker: PhantomData,
        }
    }

    /// Attempts to push; returns the value back when the ring is full.
    ///
    /// Producer side only.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        let tail = self.header.tail.load(Ordering::Relaxed);
        let head = self.header.head.load(Ordering::Acquire);
        let next = (tail + 1) % self.capacity;
        if next == head {
            return Err(value);
        }

        // SAFETY: index < capacity and the slot is outside the readable
        // [head, tail) range until the Release store publishes it.
        unsafe { self.slots.add(tail as usize).write(value) };
        self.header.tail.store(next, Ordering::Release);
        Ok(())
    }

    /// Attempts to pop; `None` when the ring is empty.
    ///
    /// Consumer side only.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        let head = self.header.head.load(Ordering::Relaxed);
        let tail = self.header.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }

        // SAFETY: index < capacity and the slot was published by the
        // producer's Release store, observed by the Acquire above.
        let value = unsafe { self.slots.add(head as usize).read() };
        self.header
            .head
            .store((head + 1) % self.capacity, Ordering::Release);
        Some(value)
    }

    /// Slot count from the header (one slot is the gap).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Advisory emptiness check.
    #[inline]
    pub fn is_empty(&self) -> bool {
        let head = self.header.head.load(Ordering::Relaxed);
        let tail = self.header.tail.load(Ordering::Relaxed);
        head == tail
    }

    /// Advisory occupancy.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.header.head.load(Ordering::Relaxed);
        let tail = self.header.tail.load(Ordering::Relaxed);
        ((tail + self.capacity - head) % self.capacity) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 8-aligned heap buffer standing in for a mapped region.
    fn region_buf(bytes: usize) -> Vec<u64> {
        vec![0u64; bytes.div_ceil(8)]
    }

    #[test]
    fn header_layout_is_wire_stable() {
        assert_eq!(mem::size_of::<ShmRingHeader>(), 24);
        assert_eq!(mem::offset_of!(ShmRingHeader, capacity), 0);
        assert_eq!(mem::offset_of!(ShmRingHeader, head), 8);
        assert_eq!(mem::offset_of!(ShmRingHeader, tail), 16);
    }

    #[test]
    fn create_push_pop_wraps_at_capacity() {
        let size = ShmSpscRing::<u32>::region_size(4);
        let mut buf = region_buf(size);
        let ptr = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();

        // SAFETY: buf spans the region and outlives the ring.
        let mut ring = unsafe { ShmSpscRing::<u32>::create(ptr, size, 4) };
        assert_eq!(ring.capacity(), 4);
        assert!(ring.is_empty());

        // Capacity 4 means 3 usable slots (one gap).
        for v in [1u32, 2, 3] {
            assert!(ring.try_push(v).is_ok());
        }
        assert_eq!(ring.try_push(4), Err(4));

        assert_eq!(ring.try_pop(), Some(1));
        assert!(ring.try_push(4).is_ok());
        for expected in [2u32, 3, 4] {
            assert_eq!(ring.try_pop(), Some(expected));
        }
        assert_eq!(ring.try_pop(), None);

        // Several laps to exercise the modulo wrap.
        for round in 0..10u32 {
            for i in 0..3 {
                assert!(ring.try_push(round * 3 + i).is_ok());
            }
            for i in 0..3 {
                assert_eq!(ring.try_pop(), Some(round * 3 + i));
            }
        }
    }

    #[test]
    fn attach_sees_creators_elements() {
        let size = ShmSpscRing::<u64>::region_size(8);
        let mut buf = region_buf(size);
        let ptr = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();

        // SAFETY: both views cover the same live buffer; producer and
        // consumer roles are kept on separate views.
        let mut producer = unsafe { ShmSpscRing::<u64>::create(ptr, size, 8) };
        let mut consumer = unsafe { ShmSpscRing::<u64>::attach(ptr, size) };
        assert_eq!(consumer.capacity(), 8);

        for i in 0..7u64 {
            assert!(producer.try_push(i).is_ok());
        }
        assert!(producer.try_push(7).is_err());

        for i in 0..7u64 {
            assert_eq!(consumer.try_pop(), Some(i));
        }
        assert_eq!(consumer.try_pop(), None);
    }

    #[test]
    #[should_panic(expected = "region too small")]
    fn create_rejects_undersized_region() {
        let mut buf = region_buf(32);
        let ptr = NonNull::new(buf.as_mut_ptr().cast::<u8>()).unwrap();
        // SAFETY: the panic fires before any region access.
        let _ = unsafe { ShmSpscRing::<u64>::create(ptr, 32, 64) };
    }
}
