use crate::{RawLock, RawUnlock};
use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

/// Mutual exclusion over `T`, parameterized by a raw lock `R`.
///
/// The guard borrows the mutex, so the protected value can only be reached
/// while the raw lock is held. With `&mut self` the data is reachable
/// without locking at all ([`Mutex::get_mut`]), which init code uses
/// before the structure is shared.
pub struct Mutex<T, R> {
    raw: R,
    cell: UnsafeCell<T>,
    // !Send/!Sync by default; the impls below opt back in.
    _marker: PhantomData<*mut ()>,
}

// Safety: the raw lock serializes all access to the cell.
unsafe impl<T: Send, R: Sync> Sync for Mutex<T, R> {}
unsafe impl<T: Send, R: Send> Send for Mutex<T, R> {}

impl<T, R> Mutex<T, R> {
    #[must_use]
    pub const fn from_raw(raw: R, value: T) -> Self {
        Self {
            raw,
            cell: UnsafeCell::new(value),
            _marker: PhantomData,
        }
    }

    /// Direct access when holding `&mut self`; no contention is possible.
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.cell.get_mut()
    }
}

impl<T, R> Mutex<T, R>
where
    R: RawLock + RawUnlock,
{
    /// Acquires the mutex, spinning until available.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T, R> {
        self.raw.raw_lock();
        MutexGuard { mutex: self }
    }

    /// Single acquisition attempt; `None` if the lock is held elsewhere.
    #[inline]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T, R>> {
        self.raw.raw_try_lock().then(|| MutexGuard { mutex: self })
    }
}

/// RAII guard; the lock is released on drop.
pub struct MutexGuard<'a, T, R>
where
    R: RawUnlock,
{
    mutex: &'a Mutex<T, R>,
}

impl<T, R> Deref for MutexGuard<'_, T, R>
where
    R: RawUnlock,
{
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the guard proves the raw lock is held.
        unsafe { &*self.mutex.cell.get() }
    }
}

impl<T, R> DerefMut for MutexGuard<'_, T, R>
where
    R: RawUnlock,
{
    fn deref_mut(&mut self) -> &mut T {
        // Safety: the guard proves the raw lock is held exclusively.
        unsafe { &mut *self.mutex.cell.get() }
    }
}

impl<T, R> Drop for MutexGuard<'_, T, R>
where
    R: RawUnlock,
{
    fn drop(&mut self) {
        // Safety: this guard acquired the lock and is the only way to
        // release it.
        unsafe { self.mutex.raw.raw_unlock() }
    }
}
