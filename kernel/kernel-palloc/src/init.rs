//! Bringing the allocator up from the PFN database.
//!
//! Initialization runs once, single threaded, before the allocator is
//! shared. The ordering matters: the node table itself must be carved
//! out of boot memory *before* the buddy system exists, through a
//! bootstrap-only reservation path ([`BootstrapReserve`]). Otherwise
//! the table's own frames could later be handed out as free memory.

use crate::alloc::FrameAllocator;
use crate::buddy::BuddyView;
use crate::node::{FrameNode, NodeTable};
use crate::region::Region;
use crate::stats::PageStats;
use crate::{MAX_ORDER, MAX_REGIONS, MIN_ORDER};
use core::array;
use core::ptr::NonNull;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, Pfn};
use kernel_pfndb::{MemoryTags, PfnDatabase};
use kernel_sync::SpinMutex;
use log::{info, warn};

/// Bytes of node-table storage needed for `page_count` managed frames,
/// rounded up to whole pages.
#[must_use]
pub const fn node_table_bytes(page_count: u64) -> u64 {
    let raw = page_count * size_of::<FrameNode>() as u64;
    (raw + (PAGE_SIZE - 1)) & !(PAGE_SIZE - 1)
}

/// Boot-time physical memory reservation, before the buddy system exists.
///
/// Implemented by the loader's flat memory-map allocator. Reserved
/// ranges are permanently removed from the map, so they never show up as
/// free in the PFN database.
pub trait BootstrapReserve {
    /// Reserves `bytes` of physical memory, page aligned.
    fn reserve(&mut self, bytes: u64) -> Option<PhysicalAddress>;
}

impl FrameAllocator {
    /// Builds the allocator over caller-provided node storage, scanning
    /// the PFN database for allocatable memory.
    ///
    /// The scan is a single linear pass with a run-length encoder: a run
    /// opens at a usable, unmapped, not-in-use frame, extends while the
    /// tag bitmask stays identical and the frame stays free, and closes
    /// into a region at any break. Region boundaries therefore fall not
    /// only at memory-map holes but wherever the tags change, so every
    /// region is tag-homogeneous by construction.
    ///
    /// # Panics
    ///
    /// Panics if `storage` does not cover exactly the database's managed
    /// range; the two are sized from the same page count, so a mismatch
    /// is a bootstrap bug.
    pub fn new(storage: &'static mut [FrameNode], db: &impl PfnDatabase) -> Self {
        let range = db.pfn_range();
        assert_eq!(
            storage.len() as u64,
            range.page_count(),
            "node storage does not match the managed PFN range"
        );
        storage.fill(FrameNode::unused());
        // Safety: `storage` is 'static, exclusively ours, and initialized.
        let nodes = unsafe {
            NodeTable::from_raw(
                NonNull::new(storage.as_mut_ptr()).expect("node storage is null"),
                range.start,
                storage.len(),
            )
        };

        let mut this = Self {
            nodes,
            regions: array::from_fn(|_| Region::empty()),
            region_count: 0,
            stats: SpinMutex::new(PageStats::default()),
        };

        // Run-length encode the database into tag-homogeneous regions.
        let mut run: Option<(Pfn, u64, MemoryTags)> = None;
        let mut pfn = range.start;
        while pfn < range.limit {
            let entry = db.entry(pfn);
            run = match run {
                Some((start, len, tags)) if entry.is_free_ram() && entry.tags() == tags => {
                    Some((start, len + 1, tags))
                }
                prev => {
                    if let Some((start, len, tags)) = prev {
                        this.seed_region(start, len, tags);
                    }
                    entry.is_free_ram().then(|| (pfn, 1, entry.tags()))
                }
            };
            pfn += 1;
        }
        if let Some((start, len, tags)) = run {
            this.seed_region(start, len, tags);
        }

        let mut total = 0;
        for region in &mut this.regions[..this.region_count] {
            total += region.inner.get_mut().total_pages;
        }
        this.stats.get_mut().num_pages_total = total;
        info!(
            "physical allocator: {} region(s), {total} pages over PFNs [{}, {})",
            this.region_count, range.start, range.limit
        );
        this
    }

    /// Reserves the node table through the bootstrap path and builds the
    /// allocator on top of it.
    ///
    /// # Safety
    ///
    /// `mapper` must translate the reserved physical range to memory
    /// that is mapped, writable, and unused for anything else.
    ///
    /// # Panics
    ///
    /// Panics if the bootstrap reservation fails; without the node table
    /// there is no physical allocator and no way to continue booting.
    pub unsafe fn bootstrap(
        db: &impl PfnDatabase,
        boot: &mut impl BootstrapReserve,
        mapper: &impl crate::mapper::PhysMapper,
    ) -> Self {
        let page_count = db.pfn_range().page_count();
        let bytes = node_table_bytes(page_count);
        let pa = boot
            .reserve(bytes)
            .expect("cannot reserve the palloc node table");
        let ptr = mapper.phys_to_ptr(pa).cast::<FrameNode>();
        // Safety: the reservation is exclusive and `mapper` guarantees
        // the range is mapped and writable; the memory is never handed
        // back, so 'static holds.
        #[allow(clippy::cast_possible_truncation)]
        let storage =
            unsafe { core::slice::from_raw_parts_mut(ptr.as_ptr(), page_count as usize) };
        Self::new(storage, db)
    }

    /// Seeds one region from a maximal contiguous, tag-homogeneous run.
    ///
    /// The run is decomposed greedily into the largest aligned
    /// power-of-two chunks, scanning orders from [`MAX_ORDER`] down and
    /// placing a chunk as soon as both the offset alignment and the
    /// remaining length permit. No two adjacent same-order free chunks
    /// can result, which is exactly the state the coalescer expects.
    fn seed_region(&mut self, start: Pfn, count: u64, tags: MemoryTags) {
        if self.region_count == MAX_REGIONS {
            warn!(
                "region table full ({MAX_REGIONS}), dropping {count} pages at PFN {start}"
            );
            return;
        }
        let index = self.region_count;
        let region = &mut self.regions[index];
        region.tags = tags;
        region.start = start;

        let inner = region.inner.get_mut();
        inner.total_pages = count;
        inner.avail_pages = count;

        #[allow(clippy::cast_possible_truncation)]
        let mut view = BuddyView {
            nodes: &self.nodes,
            inner,
            region_index: index as u8,
            region_start: start,
        };
        let mut offset = 0;
        while offset < count {
            let remaining = count - offset;
            let mut order = MAX_ORDER;
            while order > MIN_ORDER && (1u64 << order > remaining || offset % (1u64 << order) != 0)
            {
                order -= 1;
            }
            view.insert_node(start + offset, order);
            offset += 1u64 << order;
        }

        info!("region {index}: {count} pages at PFN {start}, tags {tags:?}");
        self.region_count += 1;
    }
}
