//! Bounded lock-free queues.
//!
//! # Module map
//! - `spsc`: single-producer/single-consumer ring; wait-free, gap-slot
//!   full/empty detection, split endpoint handles.
//! - `mpmc`: multi-producer/multi-consumer ring; Vyukov slot sequences.
//! - `shm_spsc`: the SPSC contract materialized over a shared-memory region
//!   for cross-process pipes.
//!
//! All queues are fixed-capacity and non-blocking: every operation is a
//! `try_*` that returns promptly. Callers wanting to wait layer their own
//! strategy (spin, yield, or a condition variable) on top.

mod mpmc;
mod shm_spsc;
mod spsc;

pub use mpmc::MpmcRingBuffer;
pub use shm_spsc::ShmSpscRing;
pub use spsc::{SpscConsumer, SpscProducer, SpscRingBuffer};
