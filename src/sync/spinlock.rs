//! Test-test-and-set spinlock with exponential backoff.
//!
//! # Design
//!
//! The lock spins on a *relaxed* load until the flag looks free and only
//! then attempts the compare-exchange. Contenders therefore share the line
//! in shared state instead of ping-ponging it in exclusive state on every
//! probe, which is what makes TTAS cheaper than naive test-and-set under
//! contention. Between probes the waiter executes an exponentially growing
//! batch of pause instructions, capped so a long critical section cannot
//! push wakeup latency past a bound.
//!
//! # Contract
//!
//! Mutual exclusion only: no fairness, no poisoning, no parking, no
//! timeout. `lock` busy-waits on the caller's thread; callers that need
//! bounded waiting build it around [`try_lock`](TtasSpinlock::try_lock).

#[cfg(not(loom))]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicBool, Ordering};

use std::marker::PhantomData;

/// Upper bound on pause iterations between probes.
const MAX_BACKOFF: usize = 1 << 16;

#[cfg(not(loom))]
#[inline]
fn pause(iterations: usize) {
    for _ in 0..iterations {
        std::hint::spin_loop();
    }
}

// Under loom a pure spin never lets the model advance the other thread.
#[cfg(loom)]
fn pause(_iterations: usize) {
    loom::thread::yield_now();
}

/// TTAS spinlock over a single atomic flag.
///
/// The lock carries no data; it mediates access to state the caller owns.
/// Acquisition hands back a [`TtasGuard`] that releases on drop.
pub struct TtasSpinlock {
    held: AtomicBool,
}

impl TtasSpinlock {
    /// Creates an unlocked spinlock.
    pub fn new() -> TtasSpinlock {
        TtasSpinlock {
            held: AtomicBool::new(false),
        }
    }

    /// Spins until the lock is acquired.
    pub fn lock(&self) -> TtasGuard<'_> {
        let mut backoff = 1usize;
        loop {
            // Test phase: relaxed loads keep the line shared while held.
            while self.held.load(Ordering::Relaxed) {
                pause(backoff);
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }

            // Test-and-set phase: acquire on success pairs with the release
            // store in unlock, ordering the critical sections.
            if self
                .held
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return TtasGuard {
                    lock: self,
                    _not_send: PhantomData,
                };
            }
        }
    }

    /// Attempts the compare-exchange once.
    pub fn try_lock(&self) -> Option<TtasGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| TtasGuard {
                lock: self,
                _not_send: PhantomData,
            })
    }

    /// Advisory snapshot of the flag.
    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

#[cfg(not(loom))]
impl Default for TtasSpinlock {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard; releases the lock with a release store on drop.
pub struct TtasGuard<'a> {
    lock: &'a TtasSpinlock,
    // Unlocking must happen on the acquiring thread.
    _not_send: PhantomData<*const ()>,
}

impl Drop for TtasGuard<'_> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}
