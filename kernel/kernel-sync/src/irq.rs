//! Interrupt-safe locking.
//!
//! A lock that may be taken from an interrupt-adjacent context must keep
//! local interrupts disabled while held, otherwise an interrupt handler
//! running on the same core could re-enter the critical section and
//! deadlock on the spin lock.
//!
//! [`IrqGuard`] snapshots the local interrupt-enable state, disables
//! interrupts, and restores the previous state on drop. On bare-metal
//! x86-64 (`target_os = "none"`) this uses `cli`/`sti`; on hosted targets
//! the guard is a no-op so the same code paths run in unit tests.

use crate::{Mutex, MutexGuard, RawLock, RawUnlock};

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
mod arch {
    /// Returns whether local interrupts are currently enabled (RFLAGS.IF).
    #[inline]
    pub fn interrupts_enabled() -> bool {
        let rflags: u64;
        // Safety: pushfq/pop is always legal in ring 0.
        unsafe {
            core::arch::asm!("pushfq; pop {}", out(reg) rflags, options(nostack, preserves_flags));
        }
        rflags & (1 << 9) != 0
    }

    /// Disables local interrupts.
    #[inline]
    pub fn disable_interrupts() {
        // Safety: privileged context is a precondition of running this kernel code.
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    /// Enables local interrupts.
    #[inline]
    pub fn enable_interrupts() {
        // Safety: see `disable_interrupts`.
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }
}

#[cfg(not(all(target_os = "none", target_arch = "x86_64")))]
mod arch {
    // Hosted builds have no interrupt flag to manage.
    #[inline]
    pub fn interrupts_enabled() -> bool {
        false
    }

    #[inline]
    pub fn disable_interrupts() {}

    #[inline]
    pub fn enable_interrupts() {}
}

/// RAII guard that disables local interrupts on creation and restores the
/// prior state on drop.
///
/// Nesting is safe: an inner guard observes interrupts already disabled
/// and restores nothing, so the outermost guard decides when interrupts
/// come back on.
pub struct IrqGuard {
    were_enabled: bool,
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let were_enabled = arch::interrupts_enabled();
        if were_enabled {
            arch::disable_interrupts();
        }
        Self { were_enabled }
    }
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            arch::enable_interrupts();
        }
    }
}

/// A mutex guard paired with an [`IrqGuard`].
///
/// Field order matters: the mutex guard is dropped first, then interrupts
/// are restored, mirroring the acquisition order.
pub struct IrqMutexGuard<'a, T, R: RawUnlock> {
    guard: MutexGuard<'a, T, R>,
    _irq: IrqGuard,
}

impl<T, R: RawUnlock> core::ops::Deref for IrqMutexGuard<'_, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, R: RawUnlock> core::ops::DerefMut for IrqMutexGuard<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T, R: RawLock + RawUnlock> Mutex<T, R> {
    /// Acquires the mutex with local interrupts disabled for the guard's
    /// lifetime.
    #[inline]
    pub fn lock_irq(&self) -> IrqMutexGuard<'_, T, R> {
        let irq = IrqGuard::new();
        let guard = self.lock();
        IrqMutexGuard { guard, _irq: irq }
    }
}

#[cfg(test)]
mod tests {
    use crate::SpinMutex;

    #[test]
    fn lock_irq_is_usable_on_hosted_targets() {
        let m = SpinMutex::new(1u32);
        {
            let mut g = m.lock_irq();
            *g += 1;
        }
        assert_eq!(*m.lock_irq(), 2);
    }

    #[test]
    fn irq_guards_nest() {
        let _outer = super::IrqGuard::new();
        let _inner = super::IrqGuard::new();
    }
}
