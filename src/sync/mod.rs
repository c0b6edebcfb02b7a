//! Userspace synchronization primitives.

mod spinlock;

pub use spinlock::{TtasGuard, TtasSpinlock};
