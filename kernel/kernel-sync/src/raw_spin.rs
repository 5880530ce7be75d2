use crate::{RawLock, RawUnlock};
use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

/// Test-and-test-and-set spin lock.
///
/// Contended waiters spin on a plain load so the cache line stays shared
/// until the lock is actually released; only then is the atomic swap
/// retried. Acquisition is bounded by the length of the critical sections
/// of other holders (no holder ever sleeps).
pub struct RawSpin {
    held: AtomicBool,
}

impl RawSpin {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }
}

impl Default for RawSpin {
    fn default() -> Self {
        Self::new()
    }
}

impl RawLock for RawSpin {
    #[inline]
    fn raw_lock(&self) {
        while self.held.swap(true, Ordering::Acquire) {
            while self.held.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
    }

    #[inline]
    fn raw_try_lock(&self) -> bool {
        !self.held.swap(true, Ordering::Acquire)
    }
}

impl RawUnlock for RawSpin {
    #[inline]
    unsafe fn raw_unlock(&self) {
        self.held.store(false, Ordering::Release);
    }
}
