//! Named POSIX shared-memory regions.
//!
//! A [`ShmRegion`] is the transport under the shared-memory SPSC ring: the
//! creator sizes and zero-initializes the segment, the attacher maps the same
//! name, and both ends agree on the byte layout out of band. Exactly one
//! process is the owner; the owner unlinks the name when it drops the region.
//!
//! Failures here are startup-time failures; once a region is mapped, the
//! ring operations on top of it never touch the filesystem again.

use std::ffi::CString;
use std::fmt;
use std::fs::File;
use std::io;
use std::os::fd::FromRawFd;

use memmap2::{MmapOptions, MmapRaw};

/// Errors from creating or attaching a shared-memory region.
#[derive(Debug)]
pub enum ShmError {
    /// The name is empty, contains NUL, or lacks the leading slash POSIX
    /// requires for portable shm names.
    InvalidName,
    /// `shm_open` failed.
    Open(io::Error),
    /// Sizing the segment with `ftruncate` failed.
    Truncate(io::Error),
    /// Mapping the segment failed.
    Map(io::Error),
}

impl fmt::Display for ShmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName => write!(f, "shared memory name must be \"/name\" without NUL"),
            Self::Open(err) => write!(f, "shm_open failed: {err}"),
            Self::Truncate(err) => write!(f, "ftruncate failed: {err}"),
            Self::Map(err) => write!(f, "mmap failed: {err}"),
        }
    }
}

impl std::error::Error for ShmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidName => None,
            Self::Open(err) | Self::Truncate(err) | Self::Map(err) => Some(err),
        }
    }
}

/// A mapped POSIX shared-memory segment.
///
/// The mapping is shared-mutable across processes by construction; the safe
/// accessor hands out a raw base pointer and the structures layered on top
/// (see [`ShmSpscRing`]) are responsible for the access discipline.
///
/// [`ShmSpscRing`]: crate::queue::ShmSpscRing
pub struct ShmRegion {
    map: MmapRaw,
    name: CString,
    owner: bool,
}

impl ShmRegion {
    /// Creates (or re-opens, if it already exists) the named segment, sizes
    /// it to `len` bytes, and maps it. The caller becomes the owner.
    pub fn create(name: &str, len: usize) -> Result<ShmRegion, ShmError> {
        Self::open_impl(name, len, true)
    }

    /// Maps an existing named segment of `len` bytes without resizing or
    /// re-initializing it. The caller is not the owner.
    pub fn attach(name: &str, len: usize) -> Result<ShmRegion, ShmError> {
        Self::open_impl(name, len, false)
    }

    fn open_impl(name: &str, len: usize, create: bool) -> Result<ShmRegion, ShmError> {
        if !name.starts_with('/') || name.len() < 2 {
            return Err(ShmError::InvalidName);
        }
        let c_name = CString::new(name).map_err(|_| ShmError::InvalidName)?;

        let mut flags = libc::O_RDWR;
        if create {
            flags |= libc::O_CREAT | libc::O_EXCL;
        }
        // SAFETY: c_name is a valid NUL-terminated string.
        let mut fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, 0o600) };
        if fd == -1 && create && io::Error::last_os_error().raw_os_error() == Some(libc::EEXIST) {
            // Reuse a leftover segment; the creator still owns (and will
            // unlink) it.
            // SAFETY: as above.
            fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0o600) };
        }
        if fd == -1 {
            return Err(ShmError::Open(io::Error::last_os_error()));
        }
        // SAFETY: fd is a freshly opened descriptor we exclusively own.
        let file = unsafe { File::from_raw_fd(fd) };

        if create {
            file.set_len(len as u64).map_err(ShmError::Truncate)?;
        }

        let map = MmapOptions::new()
            .len(len)
            .map_raw(&file)
            .map_err(ShmError::Map)?;

        Ok(ShmRegion {
            map,
            name: c_name,
            owner: create,
        })
    }

    /// Base address of the mapping.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.map.as_mut_ptr()
    }

    /// Mapped length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true when the mapping has zero length.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    /// Segment name as passed at creation, leading slash included.
    #[inline]
    pub fn name(&self) -> &str {
        // The name was built from a &str in open_impl, so it is UTF-8.
        self.name.to_str().expect("segment name validated at creation")
    }

    /// Returns true when this handle owns (and will unlink) the name.
    #[inline]
    pub fn is_owner(&self) -> bool {
        self.owner
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        if self.owner {
            // SAFETY: name is a valid NUL-terminated string; unlinking a
            // name that is already gone is harmless.
            unsafe {
                libc::shm_unlink(self.name.as_ptr());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/lowlat_{}_{}", tag, std::process::id())
    }

    #[test]
    fn rejects_bad_names() {
        assert!(matches!(
            ShmRegion::create("no-slash", 64),
            Err(ShmError::InvalidName)
        ));
        assert!(matches!(
            ShmRegion::create("/", 64),
            Err(ShmError::InvalidName)
        ));
    }

    #[test]
    fn create_then_attach_shares_bytes() {
        let name = unique_name("share");
        let owner = ShmRegion::create(&name, 4096).expect("create region");
        assert!(owner.is_owner());
        assert_eq!(owner.name(), name);
        assert_eq!(owner.len(), 4096);

        let peer = ShmRegion::attach(&name, 4096).expect("attach region");
        assert!(!peer.is_owner());

        // SAFETY: both mappings cover the same 4096-byte segment.
        unsafe {
            owner.as_ptr().write(0xC3);
            assert_eq!(peer.as_ptr().read(), 0xC3);
        }
    }

    #[test]
    fn owner_unlinks_on_drop() {
        let name = unique_name("unlink");
        drop(ShmRegion::create(&name, 128).expect("create region"));
        assert!(ShmRegion::attach(&name, 128).is_err());
    }
}
