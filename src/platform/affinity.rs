//! CPU pinning for producer/consumer threads.
//!
//! Pinning the two sides of a ring to fixed cores removes migration jitter
//! (TLB flush, cache refill, cross-socket hops) from the latency
//! distribution. In containers the process may only be allowed on a subset
//! of host CPUs; use [`allowed_cpus`] to discover valid cores rather than
//! assuming `0..num_cpus()`.
//!
//! Linux only. Other platforms report `ErrorKind::Unsupported` instead of
//! silently succeeding, so a mis-pinned benchmark cannot masquerade as a
//! pinned one.

use std::io;

/// Maximum core index addressable through the affinity API.
#[cfg(target_os = "linux")]
pub const CPU_SET_CAPACITY: usize = std::mem::size_of::<libc::cpu_set_t>() * 8;

#[cfg(not(target_os = "linux"))]
pub const CPU_SET_CAPACITY: usize = 1024;

#[inline]
fn validate_core(core: usize) -> io::Result<()> {
    if core >= CPU_SET_CAPACITY {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("core index {core} exceeds CPU_SET_CAPACITY ({CPU_SET_CAPACITY})"),
        ));
    }
    Ok(())
}

/// Pins the calling thread to `core`.
///
/// Fails when the core is out of bounds, not in the process's allowed set
/// (cgroups/cpusets), or the platform has no per-thread affinity.
#[cfg(target_os = "linux")]
pub fn pin_current_thread_to_core(core: usize) -> io::Result<()> {
    validate_core(core)?;

    // SAFETY: a zeroed cpu_set_t is valid, the core index is in bounds for
    // CPU_SET, and pthread_setaffinity_np returns its error code directly.
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);

        let rc = libc::pthread_setaffinity_np(
            libc::pthread_self(),
            std::mem::size_of::<libc::cpu_set_t>(),
            &set as *const _,
        );
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread_to_core(core: usize) -> io::Result<()> {
    validate_core(core)?;
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "CPU affinity is not supported on this platform",
    ))
}

/// Returns the set of CPUs the calling thread may run on.
///
/// Respects cgroups, cpusets, and `taskset` restrictions.
#[cfg(target_os = "linux")]
pub fn allowed_cpus() -> io::Result<CpuSet> {
    let mut set = CpuSet::new();
    // SAFETY: pid 0 queries the calling thread into a correctly sized mask.
    unsafe {
        let rc = libc::sched_getaffinity(
            0,
            std::mem::size_of::<libc::cpu_set_t>(),
            &mut set.inner as *mut _,
        );
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(set)
}

#[cfg(not(target_os = "linux"))]
pub fn allowed_cpus() -> io::Result<CpuSet> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "allowed_cpus() is not supported on this platform",
    ))
}

/// First core in the allowed set, if any.
pub fn first_allowed_cpu() -> Option<usize> {
    let allowed = allowed_cpus().ok()?;
    (0..CPU_SET_CAPACITY).find(|&core| allowed.is_set(core))
}

/// Available parallelism, honoring cgroup limits. Falls back to 1.
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// CPU affinity mask. Wraps `cpu_set_t` on Linux; a stub elsewhere.
#[derive(Clone)]
pub struct CpuSet {
    #[cfg(target_os = "linux")]
    inner: libc::cpu_set_t,
    #[cfg(not(target_os = "linux"))]
    _private: (),
}

impl CpuSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        #[cfg(target_os = "linux")]
        {
            // SAFETY: zeroed cpu_set_t is valid; CPU_ZERO makes it explicit.
            let mut inner: libc::cpu_set_t = unsafe { std::mem::zeroed() };
            unsafe { libc::CPU_ZERO(&mut inner) };
            Self { inner }
        }
        #[cfg(not(target_os = "linux"))]
        {
            Self { _private: () }
        }
    }

    /// Adds `core` to the set.
    pub fn set(&mut self, core: usize) -> io::Result<()> {
        validate_core(core)?;
        #[cfg(target_os = "linux")]
        // SAFETY: core index validated above.
        unsafe {
            libc::CPU_SET(core, &mut self.inner)
        };
        Ok(())
    }

    /// Returns true when `core` is in the set. Out-of-bounds indices are
    /// simply absent rather than undefined.
    pub fn is_set(&self, core: usize) -> bool {
        if core >= CPU_SET_CAPACITY {
            return false;
        }
        #[cfg(target_os = "linux")]
        // SAFETY: core index validated above.
        unsafe {
            libc::CPU_ISSET(core, &self.inner)
        }
        #[cfg(not(target_os = "linux"))]
        {
            false
        }
    }

    /// Number of cores in the set.
    pub fn count(&self) -> usize {
        #[cfg(target_os = "linux")]
        // SAFETY: CPU_COUNT only reads the mask.
        unsafe {
            libc::CPU_COUNT(&self.inner) as usize
        }
        #[cfg(not(target_os = "linux"))]
        {
            0
        }
    }

    /// Applies this mask to the calling thread.
    pub fn apply(&self) -> io::Result<()> {
        #[cfg(target_os = "linux")]
        // SAFETY: the mask is a valid cpu_set_t of the advertised size.
        unsafe {
            let rc = libc::pthread_setaffinity_np(
                libc::pthread_self(),
                std::mem::size_of::<libc::cpu_set_t>(),
                &self.inner as *const _,
            );
            if rc != 0 {
                return Err(io::Error::from_raw_os_error(rc));
            }
            Ok(())
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "CPU affinity is not supported on this platform",
            ))
        }
    }

    /// Iterates over set core indices.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..CPU_SET_CAPACITY).filter(move |&core| self.is_set(core))
    }
}

impl Default for CpuSet {
    fn default() -> Self {
        Self::new()
    }
}
