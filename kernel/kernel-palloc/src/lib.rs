//! # Physical Page-Frame Allocator
//!
//! A region-aware buddy allocator for physical memory: the foundation
//! every other memory facility in the kernel (struct allocator, general
//! heap, user and device mappings) is built on.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               Allocation Façade                     │
//! │   palloc / palloc_direct_mapped / palloc_tag        │
//! │   pfree, paddr- and pointer-flavored variants       │
//! │   • tag-matching policies, region fallback chains   │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                Buddy Engine                         │
//! │   • split / combine / free-list surgery             │
//! │   • per-region, under that region's lock            │
//! └─────────────────┬───────────────────────────────────┘
//! ┌─────────────────▼───────────────────────────────────┐
//! │         Node Table and Region Table                 │
//! │   • one FrameNode per managed frame                 │
//! │   • up to 32 tag-homogeneous buddy regions          │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! At init the PFN database is scanned once; every maximal contiguous
//! run of free frames with identical [`MemoryTags`] becomes a region
//! with its own free lists and its own interrupt-safe lock. Allocation
//! requests are steered to compatible regions by a [`MatchPolicy`]
//! against a tag mask, with per-caller fallback chains that relax the
//! requirements step by step.
//!
//! ## Concurrency
//!
//! Every region lock is independent and interrupt safe; no operation
//! holds two region locks at once, and the global statistics lock is
//! disjoint from all of them. All operations complete in bounded time;
//! the split/combine recursion is capped at [`MAX_ORDER`].
//!
//! ## Failure Model
//!
//! Exhaustion is recoverable and reported as [`AllocError`]; structural
//! invariant violations (unmanaged PFN, double free, corrupt free list,
//! order overflow) panic immediately rather than attempt repair. The
//! direct-mapped path also panics on total exhaustion, since its callers
//! cannot proceed without the memory.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod alloc;
mod buddy;
mod error;
mod init;
mod mapper;
mod node;
mod policy;
mod region;
mod stats;

pub use alloc::FrameAllocator;
pub use buddy::calc_order;
pub use error::AllocError;
pub use init::{BootstrapReserve, node_table_bytes};
pub use kernel_pfndb::MemoryTags;
pub use mapper::{OffsetMapper, PhysMapper};
pub use node::FrameNode;
pub use policy::MatchPolicy;
pub use stats::PageStats;

use core::ptr::NonNull;
use kernel_memory_addresses::{PhysicalAddress, Pfn};
use kernel_sync::SyncOnceCell;

/// Highest supported buddy order; a chunk of this order covers
/// `2^MAX_ORDER` pages.
pub const MAX_ORDER: usize = 15;

/// Number of per-region free lists (`MAX_ORDER + 1`).
pub const ORDER_COUNT: usize = MAX_ORDER + 1;

/// Smallest buddy order; order 0 is a single page.
pub const MIN_ORDER: usize = 0;

/// Capacity of the region table.
pub const MAX_REGIONS: usize = 32;

/// The process-wide allocator instance, installed once during boot.
static PALLOC: SyncOnceCell<FrameAllocator> = SyncOnceCell::new();

/// Installs the boot-built allocator as the global instance.
///
/// # Panics
///
/// Panics if an allocator was already installed.
pub fn install(allocator: FrameAllocator) {
    assert!(
        PALLOC.set(allocator).is_ok(),
        "physical allocator installed twice"
    );
}

/// The global allocator instance.
///
/// # Panics
///
/// Panics when called before [`install`]; allocating before the
/// physical allocator exists is a boot-ordering bug.
#[must_use]
pub fn global() -> &'static FrameAllocator {
    PALLOC
        .get()
        .expect("physical allocator used before initialization")
}

/// Allocates `count` pages of general-purpose memory.
///
/// # Errors
///
/// [`AllocError::OutOfMemory`] on total exhaustion.
pub fn palloc(count: u64) -> Result<Pfn, AllocError> {
    global().alloc(count)
}

/// Allocates `count` pages reachable without page-table translation.
/// Fatal on exhaustion.
#[must_use]
pub fn palloc_direct_mapped(count: u64) -> Pfn {
    global().alloc_direct_mapped(count)
}

/// Allocates `count` pages from the first region whose tags satisfy
/// `policy` against `mask`.
///
/// # Errors
///
/// See [`FrameAllocator::alloc_tag`].
pub fn palloc_tag(count: u64, mask: MemoryTags, policy: MatchPolicy) -> Result<Pfn, AllocError> {
    global().alloc_tag(count, mask, policy)
}

/// Frees the chunk headed by `pfn`; returns the number of pages freed.
pub fn pfree(pfn: Pfn) -> u64 {
    global().free(pfn)
}

/// [`palloc`] returning a physical byte address.
///
/// # Errors
///
/// See [`palloc`].
pub fn palloc_paddr(count: u64) -> Result<PhysicalAddress, AllocError> {
    global().alloc_paddr(count)
}

/// [`pfree`] by physical byte address.
pub fn pfree_paddr(pa: PhysicalAddress) -> u64 {
    global().free_paddr(pa)
}

/// [`palloc`] returning a kernel-visible pointer through `mapper`.
///
/// # Errors
///
/// See [`palloc`].
pub fn palloc_ptr<M: PhysMapper>(count: u64, mapper: &M) -> Result<NonNull<u8>, AllocError> {
    global().alloc_ptr(count, mapper)
}

/// [`pfree`] by kernel-visible pointer.
pub fn pfree_ptr<M: PhysMapper>(ptr: NonNull<u8>, mapper: &M) -> u64 {
    global().free_ptr(ptr, mapper)
}

/// Read-only snapshot of the global page counters.
#[must_use]
pub fn palloc_stats_page() -> PageStats {
    global().stats_pages()
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use kernel_pfndb::{PfnInfo, SlicePfnDb};

    /// Leaked node storage for `len` frames.
    pub fn leak_nodes(len: usize) -> &'static mut [FrameNode] {
        Box::leak(vec![FrameNode::unused(); len].into_boxed_slice())
    }

    /// Builds an allocator over a synthetic PFN database starting at
    /// `start`. `runs` is a sequence of `(pages, Some(tags))` for free
    /// RAM and `(pages, None)` for an unusable hole.
    pub fn allocator(start: u64, runs: &[(u64, Option<MemoryTags>)]) -> FrameAllocator {
        let mut entries = Vec::new();
        for &(pages, tags) in runs {
            for _ in 0..pages {
                entries.push(match tags {
                    Some(t) => PfnInfo::new().with_usable(true).with_tags(t),
                    None => PfnInfo::new(),
                });
            }
        }
        let db = SlicePfnDb::new(Pfn::new(start), &entries);
        FrameAllocator::new(leak_nodes(entries.len()), &db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::allocator;

    // The global façade is exercised once here; the allocator logic
    // behind it is covered in the per-module tests.
    #[test]
    fn global_facade_round_trip() {
        install(allocator(0x2000, &[(256, Some(MemoryTags::NORMAL))]));

        let pfn = palloc(4).expect("fresh allocator must satisfy a small request");
        assert_eq!(pfree(pfn), 4);

        let pa = palloc_paddr(2).unwrap();
        assert_eq!(pfree_paddr(pa), 2);

        let stats = palloc_stats_page();
        assert_eq!(stats.num_pages_total, 256);
        assert_eq!(stats.num_pages_alloc, 0);

        assert!(palloc_tag(1, MemoryTags::DIRECT_ACCESS, MatchPolicy::SetAll).is_err());
    }
}
