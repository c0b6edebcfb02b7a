//! Best-effort NUMA placement hints.
//!
//! Binding is advisory by contract: the allocators keep working with default
//! placement when the kernel rejects the hint or the platform has no NUMA
//! API at all, and no error is reported. Callers that must know the outcome
//! can inspect `numactl`/`move_pages` out of band.

/// Number of `c_ulong` words in the node mask handed to `mbind`.
///
/// 16 words cover 1024 nodes on LP64, far beyond current hardware.
#[cfg(target_os = "linux")]
const NODE_MASK_WORDS: usize = 16;

/// Returns true when the kernel exposes NUMA topology.
pub fn numa_available() -> bool {
    #[cfg(target_os = "linux")]
    {
        std::path::Path::new("/sys/devices/system/node/possible").exists()
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

/// Requests that `[ptr, ptr + len)` be physically placed on `node`.
///
/// No-op when `node` is negative, the range is empty, or the platform lacks
/// an mbind-style API. Failures are silent; the hint is best-effort.
pub fn bind_to_node(ptr: *mut u8, len: usize, node: i32) {
    #[cfg(target_os = "linux")]
    {
        if node < 0 || ptr.is_null() || len == 0 {
            return;
        }
        let bits_per_word = std::mem::size_of::<libc::c_ulong>() * 8;
        let max_nodes = NODE_MASK_WORDS * bits_per_word;
        if node as usize >= max_nodes {
            return;
        }

        let mut mask = [0 as libc::c_ulong; NODE_MASK_WORDS];
        mask[node as usize / bits_per_word] |= 1 << (node as usize % bits_per_word);

        // SAFETY: the mask outlives the call and maxnode matches its width;
        // mbind on a range we own cannot corrupt memory, only fail.
        // libc does not expose a safe `mbind` wrapper, so invoke the syscall directly.
        unsafe {
            libc::syscall(
                libc::SYS_mbind,
                ptr.cast::<libc::c_void>(),
                len as libc::c_ulong,
                libc::MPOL_BIND,
                mask.as_ptr(),
                max_nodes as libc::c_ulong,
                0,
            );
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = (ptr, len, node);
    }
}
