//! The allocation façade: tag-matching policies, region fallback, and the
//! PFN / physical-address / pointer entry points.

use crate::buddy::{BuddyView, calc_order};
use crate::error::AllocError;
use crate::mapper::PhysMapper;
use crate::node::NodeTable;
use crate::policy::MatchPolicy;
use crate::region::Region;
use crate::stats::PageStats;
use crate::{MAX_ORDER, MAX_REGIONS};
use core::ptr::NonNull;
use kernel_memory_addresses::{PhysicalAddress, Pfn};
use kernel_pfndb::MemoryTags;
use kernel_sync::SpinMutex;

/// Fallback chain for general allocations: prefer plain RAM, then
/// direct-mapped memory, then anything at all.
const GENERAL_FALLBACKS: [(MatchPolicy, MemoryTags); 3] = [
    (MatchPolicy::SetAll, MemoryTags::NORMAL),
    (MatchPolicy::SetAll, MemoryTags::DIRECT_MAPPED),
    (MatchPolicy::Ignore, MemoryTags::NONE),
];

/// Fallback chain for allocations the kernel must reach without
/// page-table translation. There is no "any tag" last resort here;
/// running dry is fatal.
const DIRECT_MAPPED_FALLBACKS: [(MatchPolicy, MemoryTags); 2] = [
    (
        MatchPolicy::SetAll,
        MemoryTags::DIRECT_MAPPED.union(MemoryTags::DIRECT_ACCESS),
    ),
    (MatchPolicy::SetAll, MemoryTags::DIRECT_MAPPED),
];

/// The region-aware physical page-frame allocator.
///
/// Owns the per-frame node table and the region table; all mutation of
/// either goes through the methods here. The structure is built once
/// during boot ([`FrameAllocator::new`]) and is safe to share across
/// cores afterwards: each region carries its own interrupt-safe lock,
/// and no operation ever holds two region locks at once.
pub struct FrameAllocator {
    pub(crate) nodes: NodeTable,
    pub(crate) regions: [Region; MAX_REGIONS],
    pub(crate) region_count: usize,
    pub(crate) stats: SpinMutex<PageStats>,
}

impl FrameAllocator {
    /// Number of regions discovered at init.
    #[must_use]
    pub const fn region_count(&self) -> usize {
        self.region_count
    }

    /// Allocates `count` pages from one specific region.
    ///
    /// The concrete allocation primitive everything else dispatches to.
    /// The chunk handed out covers `2^calc_order(count)` pages and is
    /// aligned to that size within the region.
    ///
    /// # Errors
    ///
    /// [`AllocError::OutOfMemory`] when the region cannot cover the
    /// request, or when the request rounds up to [`MAX_ORDER`]; the top
    /// order is kept as replenishment stock and never allocated whole.
    ///
    /// # Panics
    ///
    /// Panics on an out-of-range region index or an over-ceiling `count`
    /// (see [`calc_order`]).
    pub fn alloc_from_region(&self, count: u64, region_index: usize) -> Result<Pfn, AllocError> {
        assert!(
            region_index < self.region_count,
            "region index {region_index} out of range ({} regions)",
            self.region_count
        );
        let order = calc_order(count);
        if order >= MAX_ORDER {
            return Err(AllocError::OutOfMemory);
        }

        let region = &self.regions[region_index];
        let pfn = {
            let mut inner = region.inner.lock_irq();
            if inner.avail_pages < 1u64 << order {
                return Err(AllocError::OutOfMemory);
            }
            #[allow(clippy::cast_possible_truncation)]
            let mut view = BuddyView {
                nodes: &self.nodes,
                inner: &mut *inner,
                region_index: region_index as u8,
                region_start: region.start,
            };
            if view.inner.free_lists[order].is_none() {
                view.split(order + 1)?;
            }
            let pfn = view
                .pop(order)
                .expect("split succeeded but left the free list empty");
            // Safety: region lock held.
            unsafe { self.nodes.node_mut(pfn).allocated = true };
            view.inner.avail_pages -= 1u64 << order;
            pfn
        };

        self.stats.lock_irq().num_pages_alloc += 1u64 << order;
        Ok(pfn)
    }

    /// Allocates `count` pages from the first region whose tags satisfy
    /// `policy` against `mask` and which has room; regions are tried in
    /// table order, falling through on per-region exhaustion.
    ///
    /// # Errors
    ///
    /// [`AllocError::NoMatchingRegion`] when no region passes the policy
    /// at all, [`AllocError::OutOfMemory`] when the matching ones are
    /// exhausted.
    pub fn alloc_tag(
        &self,
        count: u64,
        mask: MemoryTags,
        policy: MatchPolicy,
    ) -> Result<Pfn, AllocError> {
        let mut matched = false;
        for index in 0..self.region_count {
            if !policy.matches(self.regions[index].tags, mask) {
                continue;
            }
            matched = true;
            if let Ok(pfn) = self.alloc_from_region(count, index) {
                return Ok(pfn);
            }
        }
        Err(if matched {
            AllocError::OutOfMemory
        } else {
            AllocError::NoMatchingRegion
        })
    }

    /// Allocates `count` pages of general-purpose memory, relaxing the
    /// tag requirements step by step down to "any region at all".
    ///
    /// # Errors
    ///
    /// [`AllocError::OutOfMemory`] on total exhaustion; the caller
    /// decides how to cope.
    pub fn alloc(&self, count: u64) -> Result<Pfn, AllocError> {
        for &(policy, mask) in &GENERAL_FALLBACKS {
            if let Ok(pfn) = self.alloc_tag(count, mask, policy) {
                return Ok(pfn);
            }
        }
        Err(AllocError::OutOfMemory)
    }

    /// Allocates `count` pages the kernel can reach without page-table
    /// translation (early boot tables and the like).
    ///
    /// # Panics
    ///
    /// Panics when every direct-mapped fallback is exhausted: callers of
    /// this path have no way to proceed without the memory.
    pub fn alloc_direct_mapped(&self, count: u64) -> Pfn {
        for &(policy, mask) in &DIRECT_MAPPED_FALLBACKS {
            if let Ok(pfn) = self.alloc_tag(count, mask, policy) {
                return pfn;
            }
        }
        panic!("out of direct-mapped physical memory allocating {count} pages");
    }

    /// Returns a chunk to its region and coalesces it with free buddies.
    ///
    /// Returns the number of pages freed (`2^order` of the chunk) so
    /// callers can audit their accounting.
    ///
    /// # Panics
    ///
    /// Panics if `pfn` is outside the managed range or is not the head
    /// of an allocated chunk (double free, interior frame).
    pub fn free(&self, pfn: Pfn) -> u64 {
        // Safety: between alloc and free an allocated chunk head belongs
        // solely to the caller; nobody else reads or writes its node.
        let node = unsafe { self.nodes.node(pfn) };
        assert!(
            node.head && node.allocated,
            "freeing PFN {pfn} which is not an allocated chunk head"
        );
        let order = node.order as usize;
        let region = &self.regions[node.region as usize];

        {
            let mut inner = region.inner.lock_irq();
            let mut view = BuddyView {
                nodes: &self.nodes,
                inner: &mut *inner,
                region_index: node.region,
                region_start: region.start,
            };
            view.insert_node(pfn, order);
            view.inner.avail_pages += 1u64 << order;
            view.combine(pfn);
        }

        let pages = 1u64 << order;
        self.stats.lock_irq().num_pages_alloc -= pages;
        pages
    }

    /// Snapshot of the global page counters.
    #[must_use]
    pub fn stats_pages(&self) -> PageStats {
        *self.stats.lock_irq()
    }

    /// [`Self::alloc`], returning the physical byte address of the chunk.
    ///
    /// # Errors
    ///
    /// See [`Self::alloc`].
    pub fn alloc_paddr(&self, count: u64) -> Result<PhysicalAddress, AllocError> {
        Ok(self.alloc(count)?.address())
    }

    /// [`Self::free`] by physical byte address.
    pub fn free_paddr(&self, pa: PhysicalAddress) -> u64 {
        self.free(pa.pfn())
    }

    /// [`Self::alloc`], returning a kernel-visible pointer through
    /// `mapper`.
    ///
    /// # Errors
    ///
    /// See [`Self::alloc`].
    pub fn alloc_ptr<M: PhysMapper>(
        &self,
        count: u64,
        mapper: &M,
    ) -> Result<NonNull<u8>, AllocError> {
        Ok(mapper.phys_to_ptr(self.alloc_paddr(count)?))
    }

    /// [`Self::free`] by kernel-visible pointer.
    pub fn free_ptr<M: PhysMapper>(&self, ptr: NonNull<u8>, mapper: &M) -> u64 {
        self.free_paddr(mapper.ptr_to_phys(ptr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::allocator;

    const NM: MemoryTags = MemoryTags::NORMAL;
    const DM: MemoryTags = MemoryTags::DIRECT_MAPPED;
    const DA: MemoryTags = MemoryTags::DIRECT_ACCESS;

    /// `avail_pages` of one region, quiesced.
    fn avail(a: &FrameAllocator, region: usize) -> u64 {
        a.regions[region].inner.lock().avail_pages
    }

    /// Whether `pfn` falls into region `index`.
    fn in_region(a: &FrameAllocator, pfn: Pfn, index: usize) -> bool {
        let start = a.regions[index].start;
        let total = a.regions[index].inner.lock().total_pages;
        pfn >= start && pfn < start + total
    }

    #[test]
    fn thousand_page_region_seeds_one_order_ten_chunk() {
        let a = allocator(0x1000, &[(1024, Some(NM))]);
        assert_eq!(a.region_count(), 1);
        let inner = a.regions[0].inner.lock();
        assert_eq!(inner.total_pages, 1024);
        assert_eq!(inner.avail_pages, 1024);
        for order in 0..10 {
            assert!(inner.free_lists[order].is_none(), "order {order} not empty");
        }
        assert_eq!(inner.free_lists[10], Some(Pfn::new(0x1000)));
    }

    #[test]
    fn single_page_alloc_splits_down_to_order_zero() {
        let a = allocator(0x1000, &[(1024, Some(NM))]);
        let pfn = a.alloc(1).unwrap();
        assert!(in_region(&a, pfn, 0));

        let inner = a.regions[0].inner.lock();
        assert_eq!(inner.avail_pages, 1023);
        // The other half of every split remains free: one chunk per order.
        for order in 0..=9 {
            assert!(inner.free_lists[order].is_some(), "order {order} empty");
        }
        assert!(inner.free_lists[10].is_none());
    }

    #[test]
    fn free_recombines_back_to_a_single_chunk() {
        let a = allocator(0x1000, &[(1024, Some(NM))]);
        let pfn = a.alloc(1).unwrap();
        assert_eq!(a.free(pfn), 1);

        let inner = a.regions[0].inner.lock();
        assert_eq!(inner.avail_pages, 1024);
        for order in 0..10 {
            assert!(inner.free_lists[order].is_none(), "order {order} not empty");
        }
        assert_eq!(inner.free_lists[10], Some(Pfn::new(0x1000)));
    }

    #[test]
    fn chunks_are_aligned_to_their_order_within_the_region() {
        let a = allocator(0x1000, &[(1024, Some(NM))]);
        // count = 5 rounds up to order 3.
        let pfn = a.alloc(5).unwrap();
        assert_eq!(pfn.offset_from(a.regions[0].start) % 8, 0);

        let pfn = a.alloc(4).unwrap();
        assert_eq!(pfn.offset_from(a.regions[0].start) % 4, 0);
    }

    #[test]
    fn round_trip_restores_availability() {
        let a = allocator(0x1000, &[(1024, Some(NM))]);
        let before = avail(&a, 0);
        let p1 = a.alloc(7).unwrap();
        let p2 = a.alloc(3).unwrap();
        assert_eq!(a.free(p1), 8);
        assert_eq!(a.free(p2), 4);
        assert_eq!(avail(&a, 0), before);
    }

    #[test]
    fn set_all_skips_regions_missing_required_bits() {
        // Region 0 is plain RAM with plenty of room; region 1 carries the
        // full requested mask.
        let a = allocator(0x1000, &[(256, Some(NM)), (64, Some(NM.union(DM)))]);
        assert_eq!(a.region_count(), 2);

        for _ in 0..3 {
            let pfn = a.alloc_tag(4, NM | DM, MatchPolicy::SetAll).unwrap();
            assert!(in_region(&a, pfn, 1), "chunk not from the tagged region");
        }
    }

    #[test]
    #[should_panic(expected = "exceeds the order")]
    fn over_ceiling_request_aborts() {
        let a = allocator(0x1000, &[(1024, Some(NM))]);
        let _ = a.alloc((1 << MAX_ORDER) + 1);
    }

    #[test]
    fn top_order_chunk_is_split_stock_only() {
        // A region holding exactly one order-MAX_ORDER chunk.
        let a = allocator(0, &[(1 << MAX_ORDER, Some(NM))]);
        // The whole chunk is never allocatable, even though it is free.
        assert_eq!(a.alloc(1 << MAX_ORDER), Err(AllocError::OutOfMemory));
        // Half of it is reachable by splitting.
        let pfn = a.alloc(1 << (MAX_ORDER - 1)).unwrap();
        assert_eq!(a.free(pfn), 1 << (MAX_ORDER - 1));
    }

    #[test]
    fn general_alloc_falls_back_to_any_tag() {
        // Nothing here matches NORMAL or DIRECT_MAPPED.
        let a = allocator(0x1000, &[(64, Some(DA))]);
        let pfn = a.alloc(2).unwrap();
        assert!(in_region(&a, pfn, 0));
    }

    #[test]
    fn tag_alloc_distinguishes_no_match_from_exhaustion() {
        let a = allocator(0x1000, &[(16, Some(NM))]);
        assert_eq!(
            a.alloc_tag(1, DA, MatchPolicy::SetAll),
            Err(AllocError::NoMatchingRegion)
        );
        assert_eq!(
            a.alloc_tag(32, NM, MatchPolicy::SetAll),
            Err(AllocError::OutOfMemory)
        );
    }

    #[test]
    fn exhausted_region_falls_through_to_the_next_match() {
        // Two same-tag regions separated by a hole; both match the policy.
        let a = allocator(0x1000, &[(16, Some(NM)), (8, None), (64, Some(NM))]);
        assert_eq!(a.region_count(), 2);
        // Too big for region 0, fits region 1.
        let pfn = a.alloc_tag(32, NM, MatchPolicy::SetAll).unwrap();
        assert!(in_region(&a, pfn, 1));
        // Small requests still come from the first match.
        let pfn = a.alloc_tag(1, NM, MatchPolicy::SetAll).unwrap();
        assert!(in_region(&a, pfn, 0));
    }

    #[test]
    fn direct_mapped_alloc_prefers_direct_access_regions() {
        let a = allocator(
            0x1000,
            &[(64, Some(DM)), (64, Some(DM.union(DA)))],
        );
        let pfn = a.alloc_direct_mapped(4);
        assert!(in_region(&a, pfn, 1));
    }

    #[test]
    #[should_panic(expected = "out of direct-mapped physical memory")]
    fn direct_mapped_exhaustion_is_fatal() {
        let a = allocator(0x1000, &[(64, Some(NM))]);
        let _ = a.alloc_direct_mapped(1);
    }

    #[test]
    fn stats_track_allocation_volume() {
        let a = allocator(0x1000, &[(1024, Some(NM))]);
        assert_eq!(a.stats_pages().num_pages_total, 1024);
        assert_eq!(a.stats_pages().num_pages_alloc, 0);

        let pfn = a.alloc(3).unwrap(); // order 2
        assert_eq!(a.stats_pages().num_pages_alloc, 4);
        a.free(pfn);
        assert_eq!(a.stats_pages().num_pages_alloc, 0);
        assert_eq!(a.stats_pages().num_pages_total, 1024);
    }

    #[test]
    #[should_panic(expected = "not an allocated chunk head")]
    fn double_free_panics() {
        let a = allocator(0x1000, &[(64, Some(NM))]);
        let pfn = a.alloc(1).unwrap();
        a.free(pfn);
        a.free(pfn);
    }

    #[test]
    #[should_panic(expected = "outside the managed range")]
    fn free_of_unmanaged_pfn_panics() {
        let a = allocator(0x1000, &[(64, Some(NM))]);
        a.free(Pfn::new(0x10));
    }

    #[test]
    fn paddr_variants_convert_both_ways() {
        let a = allocator(0x1000, &[(64, Some(NM))]);
        let before = avail(&a, 0);
        let pa = a.alloc_paddr(2).unwrap();
        assert!(pa.is_page_aligned());
        assert_eq!(a.free_paddr(pa), 2);
        assert_eq!(avail(&a, 0), before);
    }

    #[test]
    fn ptr_variants_go_through_the_mapper() {
        use crate::mapper::OffsetMapper;

        let a = allocator(0x1000, &[(64, Some(NM))]);
        let mapper = OffsetMapper::new(0x7000_0000);
        let ptr = a.alloc_ptr(1, &mapper).unwrap();
        assert_eq!(
            ptr.as_ptr() as usize & 0xFFF,
            0,
            "mapped pointer must stay page aligned"
        );
        assert_eq!(a.free_ptr(ptr, &mapper), 1);
    }

    #[test]
    fn concurrent_alloc_free_keeps_accounting_consistent() {
        let a = std::sync::Arc::new(allocator(0x1000, &[(1024, Some(NM))]));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let a = a.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let pfn = a.alloc(2).unwrap();
                        assert_eq!(a.free(pfn), 2);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(avail(&a, 0), 1024);
        assert_eq!(a.stats_pages().num_pages_alloc, 0);
    }
}
