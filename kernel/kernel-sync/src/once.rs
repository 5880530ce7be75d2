use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU8, Ordering};

const UNINIT: u8 = 0;
const BUSY: u8 = 1;
const READY: u8 = 2;

/// A cell that is written at most once and readable from any context
/// afterwards.
///
/// Used for globals that come alive during boot (for example the physical
/// page allocator) and are immutable handles from then on. Late readers
/// that race the initializer spin until the value is published.
pub struct SyncOnceCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

// Safety: the value is written exactly once (single BUSY winner) and only
// shared after the READY store publishes it.
unsafe impl<T: Sync> Sync for SyncOnceCell<T> {}
unsafe impl<T: Send> Send for SyncOnceCell<T> {}

impl<T> SyncOnceCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINIT),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Returns the value if it has been initialized.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        if self.state.load(Ordering::Acquire) == READY {
            // Safety: READY implies the write completed.
            Some(unsafe { (*self.value.get()).assume_init_ref() })
        } else {
            None
        }
    }

    /// Stores `value` if the cell is still empty.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` if the cell was already initialized (or is
    /// being initialized concurrently).
    pub fn set(&self, value: T) -> Result<(), T> {
        if self
            .state
            .compare_exchange(UNINIT, BUSY, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(value);
        }
        // Safety: we won the BUSY transition, nobody else writes.
        unsafe {
            (*self.value.get()).write(value);
        }
        self.state.store(READY, Ordering::Release);
        Ok(())
    }

    /// Initializes the cell with `init` if empty, then returns the value.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        if let Some(v) = self.get() {
            return v;
        }
        if self
            .state
            .compare_exchange(UNINIT, BUSY, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            // Safety: we won the BUSY transition.
            unsafe {
                (*self.value.get()).write(init());
            }
            self.state.store(READY, Ordering::Release);
        } else {
            // Lost the race; wait for the winner to publish.
            while self.state.load(Ordering::Acquire) != READY {
                spin_loop();
            }
        }
        // Safety: READY.
        unsafe { (*self.value.get()).assume_init_ref() }
    }
}

impl<T> Default for SyncOnceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for SyncOnceCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == READY {
            // Safety: READY implies the write completed; `&mut self`
            // excludes readers.
            unsafe { self.value.get_mut().assume_init_drop() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let c: SyncOnceCell<u32> = SyncOnceCell::new();
        assert!(c.get().is_none());
    }

    #[test]
    fn set_wins_only_once() {
        let c = SyncOnceCell::new();
        assert_eq!(c.set(1), Ok(()));
        assert_eq!(c.set(2), Err(2));
        assert_eq!(c.get(), Some(&1));
    }

    #[test]
    fn get_or_init_runs_once() {
        let c = SyncOnceCell::new();
        assert_eq!(*c.get_or_init(|| 10), 10);
        assert_eq!(*c.get_or_init(|| 20), 10);
    }
}
