//! Region-based allocators: bump arena, fixed-size pool, and their
//! NUMA-aware compositions.
//!
//! All allocators here trade generality for determinism: capacity is fixed
//! up front, the hot path never calls into the global allocator, and
//! exhaustion is an expected `None`, not an error. None of them are
//! thread-safe: give each worker its own, or wrap one in a
//! [`TtasSpinlock`](crate::sync::TtasSpinlock).

mod arena;
mod numa;
mod pool;

pub use arena::Arena;
pub use numa::{NumaArena, NumaPool};
pub use pool::FixedPool;

use std::fmt;

/// Errors from allocator construction. Construction is the only fallible
/// path; steady-state operations report exhaustion through `Option`.
#[derive(Debug, PartialEq, Eq)]
pub enum AllocInitError {
    /// The requested size overflowed or produced an invalid layout.
    InvalidLayout,
    /// The global allocator returned null.
    OutOfMemory,
}

impl fmt::Display for AllocInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLayout => write!(f, "requested allocator layout is invalid"),
            Self::OutOfMemory => write!(f, "allocator backing allocation failed"),
        }
    }
}

impl std::error::Error for AllocInitError {}
