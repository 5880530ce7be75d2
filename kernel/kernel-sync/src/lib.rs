//! # Kernel synchronization primitives
//!
//! Spin-based mutual exclusion for preemptible, multi-core kernel code,
//! plus a once-cell for late-initialized globals.
//!
//! The mutex is split along a raw-lock seam ([`RawLock`] / [`RawUnlock`])
//! so the acquisition strategy can vary independently of the guarded data.
//! [`Mutex::lock_irq`] additionally disables local interrupts for the
//! lifetime of the guard, which is required for locks that may be taken
//! from interrupt-adjacent contexts.
//!
//! On hosted targets (unit tests) the interrupt guard is a no-op, so code
//! using `lock_irq` runs unchanged under `cargo test`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod mutex;
mod once;
mod raw_spin;

pub use irq::{IrqGuard, IrqMutexGuard};
pub use mutex::{Mutex, MutexGuard};
pub use once::SyncOnceCell;
pub use raw_spin::RawSpin;

/// A mutex backed by a test-and-test-and-set spin lock.
pub type SpinMutex<T> = Mutex<T, RawSpin>;

impl<T> SpinMutex<T> {
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawSpin::new(), value)
    }
}

/// Blocking acquisition side of a raw lock.
pub trait RawLock {
    /// Acquires the lock, spinning until it is available.
    fn raw_lock(&self);
    /// Attempts to acquire the lock once, without spinning.
    fn raw_try_lock(&self) -> bool;
}

/// Release side of a raw lock.
pub trait RawUnlock {
    /// Releases the lock.
    ///
    /// # Safety
    ///
    /// The caller must currently hold the lock.
    unsafe fn raw_unlock(&self);
}
