//! Cache-line geometry and prefetch hints.
//!
//! Index/sequence fields in the ring buffers are padded with
//! `crossbeam_utils::CachePadded`; this module only exports the raw constant
//! for layout math (region sizing, alignment assertions) plus best-effort
//! prefetch helpers for callers that walk slot arrays.

/// Conservative coherence-granule size in bytes.
///
/// 64 is correct for current x86-64 and most AArch64 server parts. Some
/// Apple and server CPUs pair lines and behave as if the destructive
/// interference granule were 128 bytes; callers padding by hand may want to
/// double this.
pub const CACHE_LINE_SIZE: usize = 64;

/// Hints the CPU to pull the line containing `ptr` into cache for a read.
///
/// Purely advisory; a no-op on targets without a prefetch primitive.
#[inline(always)]
pub fn prefetch_read<T>(ptr: *const T) {
    #[cfg(target_arch = "x86_64")]
    // SAFETY: PREFETCHT0 never faults, even on invalid addresses.
    unsafe {
        use core::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        _mm_prefetch::<_MM_HINT_T0>(ptr.cast::<i8>());
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = ptr;
}

/// Hints the CPU to pull the line containing `ptr` into cache for a write.
#[inline(always)]
pub fn prefetch_write<T>(ptr: *const T) {
    // x86-64 has no distinct write prefetch outside PREFETCHW extensions;
    // T0 is the portable best effort.
    prefetch_read(ptr);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefetch_accepts_any_pointer() {
        let value = 7u64;
        prefetch_read(&value);
        prefetch_write(&value);
        // Dangling pointers must not fault either.
        prefetch_read(core::ptr::null::<u64>());
    }

    #[test]
    fn cache_line_size_is_power_of_two() {
        const { assert!(CACHE_LINE_SIZE.is_power_of_two()) };
    }
}
