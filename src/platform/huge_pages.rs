//! Anonymous memory regions, ideally backed by huge pages.
//!
//! On Linux the allocator first asks for an anonymous hugetlb mapping
//! (2 MiB default huge pages) and silently falls back to regular anonymous
//! pages when the system has no hugetlb pool configured. Other platforms go
//! straight to the fallback. Callers should therefore allocate a small number
//! of large regions and sub-allocate from them (see [`Arena`]).
//!
//! [`Arena`]: crate::alloc::Arena

use std::io;

use memmap2::{MmapOptions, MmapRaw};

/// Default huge-page size assumed for the hugetlb attempt (2 MiB).
///
/// x86-64 and AArch64 Linux both default to 2 MiB; systems configured for
/// other sizes simply take the fallback path.
const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// log2 of [`HUGE_PAGE_SIZE`], as `mmap`'s `MAP_HUGE_*` encoding wants it.
#[cfg(target_os = "linux")]
const HUGE_PAGE_SHIFT: u8 = HUGE_PAGE_SIZE.trailing_zeros() as u8;

fn page_size() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf with a valid name has no preconditions.
        let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if raw > 0 {
            return raw as usize;
        }
    }
    4096
}

fn round_up(len: usize, granule: usize) -> usize {
    debug_assert!(granule.is_power_of_two());
    (len + granule - 1) & !(granule - 1)
}

/// An owned anonymous mapping of at least the requested length.
///
/// The region unmaps on drop. `align` reports the page granularity actually
/// obtained, so callers can tell whether the hugetlb attempt succeeded.
pub struct HugePageRegion {
    mapping: MmapRaw,
    align: usize,
}

impl HugePageRegion {
    /// Maps at least `min_len` bytes, preferring huge pages.
    ///
    /// `min_len` is rounded up to a multiple of the page granule that ends up
    /// backing the region. Errors only when even the regular-page fallback
    /// fails; a missing hugetlb pool is not an error.
    pub fn allocate(min_len: usize) -> io::Result<HugePageRegion> {
        #[cfg(target_os = "linux")]
        {
            let rounded = round_up(min_len.max(1), HUGE_PAGE_SIZE);
            if let Ok(mapping) = MmapOptions::new()
                .len(rounded)
                .huge(Some(HUGE_PAGE_SHIFT))
                .map_anon()
            {
                return Ok(HugePageRegion {
                    mapping: MmapRaw::from(mapping),
                    align: HUGE_PAGE_SIZE,
                });
            }
        }

        let ps = page_size();
        let rounded = round_up(min_len.max(1), ps);
        let mapping = MmapOptions::new().len(rounded).map_anon()?;
        Ok(HugePageRegion {
            mapping: MmapRaw::from(mapping),
            align: ps,
        })
    }

    /// Base address of the mapping.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.mapping.as_mut_ptr()
    }

    /// Bytes actually mapped (requested length rounded up).
    #[inline]
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Returns true when the mapping has zero length.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mapping.len() == 0
    }

    /// Page granularity of the mapping: the huge-page size when the hugetlb
    /// attempt succeeded, the regular page size otherwise.
    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_rounds_up_and_aligns() {
        let region = HugePageRegion::allocate(10).expect("anonymous mapping");
        assert!(region.len() >= 10);
        assert!(region.align().is_power_of_two());
        assert!(region.len().is_multiple_of(region.align()));
        assert_eq!(region.as_ptr() as usize % region.align(), 0);
    }

    #[test]
    fn region_is_writable() {
        let region = HugePageRegion::allocate(4096).expect("anonymous mapping");
        // SAFETY: the mapping is private, writable, and at least 4096 bytes.
        unsafe {
            region.as_ptr().write(0xA5);
            region.as_ptr().add(region.len() - 1).write(0x5A);
            assert_eq!(region.as_ptr().read(), 0xA5);
        }
    }

    #[test]
    fn zero_request_still_maps_a_page() {
        let region = HugePageRegion::allocate(0).expect("anonymous mapping");
        assert!(region.len() > 0);
    }
}
