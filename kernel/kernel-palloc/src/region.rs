use crate::ORDER_COUNT;
use kernel_memory_addresses::Pfn;
use kernel_pfndb::MemoryTags;
use kernel_sync::SpinMutex;

/// Lock-guarded part of a region: accounting plus the buddy free lists.
#[derive(Debug)]
pub(crate) struct RegionInner {
    /// Frames this region was seeded with.
    pub total_pages: u64,
    /// Frames currently sitting in free lists. Always equals the sum of
    /// `2^order` over all free chunks.
    pub avail_pages: u64,
    /// Head of the intrusive free list per order; `None` means empty.
    pub free_lists: [Option<Pfn>; ORDER_COUNT],
}

impl RegionInner {
    pub const fn empty() -> Self {
        Self {
            total_pages: 0,
            avail_pages: 0,
            free_lists: [None; ORDER_COUNT],
        }
    }
}

/// One allocation region: a maximal contiguous, tag-homogeneous span of
/// physical memory with its own buddy system.
///
/// `tags` and `start` are written once during init, before the allocator
/// is shared, and read without the lock afterwards. Everything that
/// changes at runtime lives behind `inner`.
pub(crate) struct Region {
    /// Memory-property tags shared by every frame in the region.
    pub tags: MemoryTags,
    /// First frame of the region; buddy alignment is relative to this.
    pub start: Pfn,
    pub inner: SpinMutex<RegionInner>,
}

impl Region {
    pub const fn empty() -> Self {
        Self {
            tags: MemoryTags::NONE,
            start: Pfn::new(0),
            inner: SpinMutex::new(RegionInner::empty()),
        }
    }
}
