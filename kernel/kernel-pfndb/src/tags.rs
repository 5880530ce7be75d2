use core::fmt;
use core::ops::{BitOr, BitOrAssign};

/// Memory-property tag bitmask.
///
/// Tags describe allocation-relevant properties of physical memory and
/// steer requests toward compatible frames. Other kernel components pass
/// these masks as literal constants, so the bit assignments are ABI:
///
/// | Bit | Constant | Meaning |
/// |-----|----------|---------|
/// | 0 | [`NORMAL`](Self::NORMAL) | Ordinary RAM with no special access requirements. |
/// | 1 | [`DIRECT_MAPPED`](Self::DIRECT_MAPPED) | Reachable through the kernel's direct mapping, no page-table walk needed. |
/// | 2 | [`DIRECT_ACCESS`](Self::DIRECT_ACCESS) | Safe for device-style direct access (e.g. early boot tables, DMA-adjacent structures). |
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
#[repr(transparent)]
pub struct MemoryTags(u32);

impl MemoryTags {
    /// The empty mask.
    pub const NONE: Self = Self(0);
    /// Ordinary RAM.
    pub const NORMAL: Self = Self(1 << 0);
    /// Covered by the kernel's direct mapping.
    pub const DIRECT_MAPPED: Self = Self(1 << 1);
    /// Safe for untranslated direct access.
    pub const DIRECT_ACCESS: Self = Self(1 << 2);

    /// Wraps a raw bit pattern.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bit pattern.
    #[must_use]
    pub const fn into_bits(self) -> u32 {
        self.0
    }

    /// Alias for [`Self::into_bits`], reading better at call sites.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether no tag bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every bit of `mask` is present in `self`.
    #[must_use]
    pub const fn contains_all(self, mask: Self) -> bool {
        self.0 & mask.0 == mask.0
    }

    /// Whether at least one bit of `mask` is present in `self`.
    #[must_use]
    pub const fn intersects(self, mask: Self) -> bool {
        self.0 & mask.0 != 0
    }

    /// Combined mask; the `const` counterpart of `|`.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for MemoryTags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for MemoryTags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for MemoryTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryTags({:#05b})", self.0)
    }
}
