//! Platform services: the thin OS-facing layer under the allocators and
//! queues.
//!
//! Everything here degrades gracefully: huge pages fall back to regular
//! pages, NUMA binding is a silent hint, and only CPU pinning reports
//! `Unsupported` loudly (a benchmark that believes it is pinned when it is
//! not produces wrong numbers, not just slow ones).
//!
//! # Module map
//! - `cache`: cache-line constant and prefetch hints.
//! - `huge_pages`: anonymous regions, hugetlb first, page fallback.
//! - `numa`: best-effort `mbind` placement of a byte range.
//! - `affinity`: CPU pinning and allowed-CPU discovery.
//! - `shm`: named POSIX shared-memory segments (unix only).

pub mod affinity;
pub mod cache;
pub mod huge_pages;
pub mod numa;
#[cfg(unix)]
pub mod shm;

pub use cache::{prefetch_read, prefetch_write, CACHE_LINE_SIZE};
pub use huge_pages::HugePageRegion;
pub use numa::{bind_to_node, numa_available};
#[cfg(unix)]
pub use shm::{ShmError, ShmRegion};
