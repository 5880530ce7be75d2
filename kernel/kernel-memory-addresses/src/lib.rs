//! # Physical Memory Address Types
//!
//! Strongly typed wrappers for physical addresses and page-frame numbers
//! used by the physical memory manager.
//!
//! ## Overview
//!
//! Physical memory is managed at page granularity, so most code wants to
//! talk about *page frames* rather than byte addresses. This crate defines
//! two zero-cost wrappers around `u64` that keep the two units apart at
//! compile time:
//!
//! | Type | Unit | Description |
//! |------|------|-------------|
//! | [`PhysicalAddress`] | bytes | A raw physical byte address. |
//! | [`Pfn`] | pages | A page-frame number, i.e. a physical address divided by [`PAGE_SIZE`]. |
//!
//! Conversions between the two are explicit ([`PhysicalAddress::pfn`] and
//! [`Pfn::address`]) and `const fn`, so mixing them up is a type error
//! instead of an off-by-a-shift bug.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x0000_0010_2000_0000);
//! let pfn = pa.pfn();
//! assert_eq!(pfn.as_u64(), 0x10_2000_0000 >> PAGE_SHIFT);
//! assert_eq!(pfn.address(), pa);
//!
//! // Frame arithmetic stays in page units.
//! let next = pfn + 1;
//! assert_eq!(next.address().as_u64(), pa.as_u64() + PAGE_SIZE);
//! ```
//!
//! ## Design Notes
//!
//! - Both types are `#[repr(transparent)]` and implement `Copy`, `Eq`,
//!   `Ord`, and `Hash`, making them suitable as map keys or for FFI use.
//! - The base page granularity is fixed at 4 KiB; larger allocation units
//!   are expressed as powers of two *pages* (buddy orders), not as
//!   distinct page sizes.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// Base page granularity in bytes (4 KiB).
pub const PAGE_SIZE: u64 = 4096;

/// log2([`PAGE_SIZE`]), i.e. the number of low address bits inside a page.
pub const PAGE_SHIFT: u32 = 12;

/// A raw 64-bit physical byte address.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
#[repr(transparent)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    /// Wraps a raw physical address.
    #[inline(always)]
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw address value.
    #[inline(always)]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the page frame containing this address.
    #[inline(always)]
    #[must_use]
    pub const fn pfn(self) -> Pfn {
        Pfn(self.0 >> PAGE_SHIFT)
    }

    /// Whether this address lies on a page boundary.
    #[inline(always)]
    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.0 & (PAGE_SIZE - 1) == 0
    }

    /// Rounds up to the next page boundary (identity when already aligned).
    #[inline(always)]
    #[must_use]
    pub const fn align_up_to_page(self) -> Self {
        Self((self.0 + (PAGE_SIZE - 1)) & !(PAGE_SIZE - 1))
    }

    /// Rounds down to the containing page boundary.
    #[inline(always)]
    #[must_use]
    pub const fn align_down_to_page(self) -> Self {
        Self(self.0 & !(PAGE_SIZE - 1))
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: u64) -> Self {
        Self(self.0 + rhs)
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalAddress({:#018x})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// A physical page-frame number: a [`PhysicalAddress`] divided by
/// [`PAGE_SIZE`].
///
/// Arithmetic on `Pfn` is in whole pages. Converting back to a byte address
/// is a shift, see [`Pfn::address`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
#[repr(transparent)]
pub struct Pfn(u64);

impl Pfn {
    /// Wraps a raw frame number.
    #[inline(always)]
    #[must_use]
    pub const fn new(pfn: u64) -> Self {
        Self(pfn)
    }

    /// Returns the raw frame number.
    #[inline(always)]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the raw frame number as `usize`, for indexing tables.
    #[inline(always)]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Returns the physical byte address of the first byte of this frame.
    #[inline(always)]
    #[must_use]
    pub const fn address(self) -> PhysicalAddress {
        PhysicalAddress(self.0 << PAGE_SHIFT)
    }

    /// Frame-count distance from `origin` to `self`.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `origin > self`.
    #[inline(always)]
    #[must_use]
    pub const fn offset_from(self, origin: Self) -> u64 {
        self.0 - origin.0
    }

    /// Checked frame addition, `None` on `u64` overflow.
    #[inline(always)]
    #[must_use]
    pub const fn checked_add(self, pages: u64) -> Option<Self> {
        match self.0.checked_add(pages) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl Add<u64> for Pfn {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: u64) -> Self {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for Pfn {
    #[inline(always)]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl Sub<u64> for Pfn {
    type Output = Self;

    #[inline(always)]
    fn sub(self, rhs: u64) -> Self {
        Self(self.0 - rhs)
    }
}

impl fmt::Debug for Pfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pfn({:#x})", self.0)
    }
}

impl fmt::Display for Pfn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
