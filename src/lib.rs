//! Low-latency concurrency and memory primitives.
//!
//! Building blocks for latency-sensitive services (trading gateways,
//! streaming engines, packet pipelines): bounded lock-free queues, region
//! allocators, and a contention-friendly spinlock, with thin platform
//! helpers for huge pages, NUMA placement, CPU pinning, and shared memory.
//!
//! # Design themes
//! - Fixed capacity everywhere; exhaustion and would-block are ordinary
//!   `None`/`Err(value)` returns, never errors or panics.
//! - No hidden threads, no blocking, no allocation on hot paths; every
//!   operation runs on the caller's thread and returns promptly.
//! - Memory ordering is part of each type's contract and documented at the
//!   point of use; cache-line padding between producer- and consumer-owned
//!   fields is load-bearing, not cosmetic.
//! - Platform features (huge pages, NUMA) degrade silently to the next-best
//!   behavior; only CPU pinning fails loudly.
//!
//! # Module map
//! - [`queue`]: SPSC and MPMC bounded rings, plus the SPSC layout over a
//!   shared-memory region.
//! - [`alloc`]: bump arena, fixed-size pool, NUMA-aware compositions.
//! - [`sync`]: TTAS spinlock with exponential backoff.
//! - [`platform`]: cache-line constant, huge pages, NUMA hints, CPU
//!   affinity, POSIX shared memory.
//!
//! # Safety
//! The queues and allocators use `unsafe` internally under documented
//! invariants; the public surface confines the remaining obligations
//! (pool `deallocate`, zero-copy slot commit/release, shared-memory
//! attachment) to explicitly `unsafe` methods with stated contracts.

pub mod alloc;
pub mod platform;
pub mod queue;
pub mod sync;

#[cfg(test)]
pub mod test_utils;

pub use alloc::{Arena, FixedPool, NumaArena, NumaPool};
pub use platform::CACHE_LINE_SIZE;
pub use queue::{MpmcRingBuffer, ShmSpscRing, SpscConsumer, SpscProducer, SpscRingBuffer};
pub use sync::{TtasGuard, TtasSpinlock};
