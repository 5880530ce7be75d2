//! # PFN Database Interface
//!
//! Read access to the per-page-frame metadata table that the firmware /
//! memory-map discovery stage builds during boot.
//!
//! The physical allocator consumes this database exactly once, at
//! initialization, to find out which frames exist, which are free, and
//! what properties ([`MemoryTags`]) each frame carries. Building the
//! database is the job of earlier boot code and is not part of this crate;
//! here live only the stable pieces both sides agree on:
//!
//! - [`MemoryTags`]: the tag bitmask, passed around by value between
//!   kernel components; the bit positions are ABI and must not change.
//! - [`PfnInfo`]: one packed 64-bit metadata word per frame.
//! - [`PfnDatabase`]: the lookup interface the allocator consumes.
//! - [`SlicePfnDb`]: the canonical slice-backed implementation, used for
//!   a table carved out of boot memory and for tests alike.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod tags;

pub use tags::MemoryTags;

use bitfield_struct::bitfield;
use kernel_memory_addresses::Pfn;

/// One packed metadata word per physical page frame.
///
/// Bit layout:
///
/// | Bits  | Name     | Meaning                                         |
/// |-------|----------|-------------------------------------------------|
/// | 0     | `usable` | Frame is backed by allocatable RAM.             |
/// | 1     | `inuse`  | Frame was claimed before the allocator existed. |
/// | 2     | `mapped` | Frame is already mapped by boot page tables.    |
/// | 3–31  | (pad)    | Reserved.                                       |
/// | 32–63 | `tags`   | [`MemoryTags`] bitmask for this frame.          |
///
/// A frame is *allocatable seed material* iff `usable && !inuse && !mapped`.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PfnInfo {
    /// Frame is backed by allocatable RAM (not a hole, not MMIO).
    pub usable: bool,
    /// Frame was claimed by the loader or an earlier boot stage.
    pub inuse: bool,
    /// Frame is referenced by the boot page tables.
    pub mapped: bool,
    #[bits(29)]
    __: u32,
    /// Memory-property tags for this frame.
    #[bits(32, default = MemoryTags::NONE)]
    pub tags: MemoryTags,
}

impl PfnInfo {
    /// Whether the allocator may seed its free lists with this frame.
    #[must_use]
    pub const fn is_free_ram(self) -> bool {
        self.usable() && !self.inuse() && !self.mapped()
    }
}

/// The contiguous PFN span covered by a database.
///
/// `limit` is exclusive; every PFN in `start..limit` has an entry.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct PfnRange {
    pub start: Pfn,
    pub limit: Pfn,
}

impl PfnRange {
    /// Number of frames in the span.
    #[must_use]
    pub const fn page_count(&self) -> u64 {
        self.limit.as_u64() - self.start.as_u64()
    }

    /// Whether `pfn` has an entry in this span.
    #[must_use]
    pub const fn contains(&self, pfn: Pfn) -> bool {
        self.start.as_u64() <= pfn.as_u64() && pfn.as_u64() < self.limit.as_u64()
    }
}

/// Lookup interface over the per-frame metadata table.
pub trait PfnDatabase {
    /// The managed PFN span.
    fn pfn_range(&self) -> PfnRange;

    /// The metadata word for `pfn`.
    ///
    /// # Panics
    ///
    /// Panics if `pfn` is outside [`Self::pfn_range`]; asking about an
    /// unmanaged frame is a programming error.
    fn entry(&self, pfn: Pfn) -> PfnInfo;
}

/// Slice-backed [`PfnDatabase`], entry `i` describing frame `start + i`.
pub struct SlicePfnDb<'a> {
    start: Pfn,
    entries: &'a [PfnInfo],
}

impl<'a> SlicePfnDb<'a> {
    #[must_use]
    pub const fn new(start: Pfn, entries: &'a [PfnInfo]) -> Self {
        Self { start, entries }
    }
}

impl PfnDatabase for SlicePfnDb<'_> {
    fn pfn_range(&self) -> PfnRange {
        PfnRange {
            start: self.start,
            limit: self.start + self.entries.len() as u64,
        }
    }

    fn entry(&self, pfn: Pfn) -> PfnInfo {
        assert!(
            self.pfn_range().contains(pfn),
            "PFN {pfn} outside managed range {:?}",
            self.pfn_range()
        );
        self.entries[pfn.offset_from(self.start) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_word_packs_and_unpacks() {
        let info = PfnInfo::new()
            .with_usable(true)
            .with_mapped(true)
            .with_tags(MemoryTags::NORMAL | MemoryTags::DIRECT_MAPPED);
        assert!(info.usable());
        assert!(!info.inuse());
        assert!(info.mapped());
        assert_eq!(info.tags(), MemoryTags::NORMAL | MemoryTags::DIRECT_MAPPED);

        let raw = info.into_bits();
        assert_eq!(PfnInfo::from_bits(raw), info);
        // Tags occupy the high half of the word.
        assert_eq!(raw >> 32, u64::from((MemoryTags::NORMAL | MemoryTags::DIRECT_MAPPED).bits()));
    }

    #[test]
    fn free_ram_requires_all_three_conditions() {
        let free = PfnInfo::new().with_usable(true);
        assert!(free.is_free_ram());
        assert!(!free.with_inuse(true).is_free_ram());
        assert!(!free.with_mapped(true).is_free_ram());
        assert!(!PfnInfo::new().is_free_ram());
    }

    #[test]
    fn slice_db_range_and_lookup() {
        let entries = [
            PfnInfo::new().with_usable(true),
            PfnInfo::new(),
            PfnInfo::new().with_usable(true).with_tags(MemoryTags::DIRECT_ACCESS),
        ];
        let db = SlicePfnDb::new(Pfn::new(0x100), &entries);

        let range = db.pfn_range();
        assert_eq!(range.page_count(), 3);
        assert!(range.contains(Pfn::new(0x102)));
        assert!(!range.contains(Pfn::new(0x103)));

        assert!(db.entry(Pfn::new(0x100)).usable());
        assert_eq!(db.entry(Pfn::new(0x102)).tags(), MemoryTags::DIRECT_ACCESS);
    }

    #[test]
    #[should_panic(expected = "outside managed range")]
    fn out_of_range_lookup_panics() {
        let entries = [PfnInfo::new()];
        let db = SlicePfnDb::new(Pfn::new(8), &entries);
        let _ = db.entry(Pfn::new(7));
    }
}
