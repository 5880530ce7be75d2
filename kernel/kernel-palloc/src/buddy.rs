//! The buddy engine: split, combine, and free-list surgery.
//!
//! Everything here operates on a single region with that region's lock
//! held, expressed as a [`BuddyView`] borrowing the locked
//! [`RegionInner`] together with the shared node table. Chunk alignment
//! is relative to the region's first frame: a chunk of order `k` always
//! sits at an offset that is a multiple of `2^k`, which is what makes the
//! `offset ^ 2^k` buddy computation valid.

use crate::error::AllocError;
use crate::node::NodeTable;
use crate::region::RegionInner;
use crate::{MAX_ORDER, MIN_ORDER};
use kernel_memory_addresses::Pfn;

/// Smallest order whose chunk covers `count` pages, i.e.
/// `ceil(log2(count))` clamped to [`MIN_ORDER`].
///
/// # Panics
///
/// Panics for `count == 0` and for `count > 2^MAX_ORDER`: both are
/// programming errors, not runtime exhaustion. The order ceiling is hard;
/// no request may exceed it.
#[must_use]
pub fn calc_order(count: u64) -> usize {
    assert!(count > 0, "allocation of zero pages");
    assert!(
        count <= 1 << MAX_ORDER,
        "allocation of {count} pages exceeds the order-{MAX_ORDER} ceiling"
    );
    let order = (u64::BITS - (count - 1).leading_zeros()) as usize;
    order.max(MIN_ORDER)
}

/// A region's buddy system, viewed under its lock.
pub(crate) struct BuddyView<'a> {
    pub nodes: &'a NodeTable,
    pub inner: &'a mut RegionInner,
    /// Index of this region in the region table.
    pub region_index: u8,
    /// First frame of the region; alignment origin for buddy math.
    pub region_start: Pfn,
}

impl BuddyView<'_> {
    /// Prepends the chunk at `pfn` onto the free list for `order`. O(1).
    pub fn insert_node(&mut self, pfn: Pfn, order: usize) {
        let prev_head = self.inner.free_lists[order];
        // Safety: region lock held (view invariant).
        let node = unsafe { self.nodes.node_mut(pfn) };
        node.order = order as u8;
        node.region = self.region_index;
        node.allocated = false;
        node.head = true;
        node.next = prev_head;
        self.inner.free_lists[order] = Some(pfn);
    }

    /// Unlinks the specific chunk `pfn` from the free list for `order`.
    ///
    /// O(n) in the list length for the non-head case; per-order lists are
    /// short enough that the simplicity wins.
    ///
    /// # Panics
    ///
    /// Panics if `pfn` is not on that list: the caller asserted it was,
    /// so the bookkeeping is corrupt and must not be repaired silently.
    pub fn remove_node(&mut self, pfn: Pfn, order: usize) {
        // Safety (all accesses below): region lock held.
        let head = self.inner.free_lists[order];
        if head == Some(pfn) {
            self.inner.free_lists[order] = unsafe { self.nodes.node(pfn).next };
            return;
        }

        let mut cursor = head;
        while let Some(cur) = cursor {
            let next = unsafe { self.nodes.node(cur).next };
            if next == Some(pfn) {
                let after = unsafe { self.nodes.node(pfn).next };
                unsafe { self.nodes.node_mut(cur).next = after };
                return;
            }
            cursor = next;
        }
        panic!("PFN {pfn} not in the order-{order} free list of region {}", self.region_index);
    }

    /// Pops the head of the free list for `order`, if any.
    pub fn pop(&mut self, order: usize) -> Option<Pfn> {
        let pfn = self.inner.free_lists[order]?;
        // Safety: region lock held.
        self.inner.free_lists[order] = unsafe { self.nodes.node(pfn).next };
        Some(pfn)
    }

    /// Halves one free chunk of `order` into two `order - 1` chunks,
    /// replenishing `order` itself from above first if its list is empty.
    ///
    /// # Errors
    ///
    /// [`AllocError::OutOfMemory`] when the recursion runs past
    /// [`MAX_ORDER`]: the region genuinely has no chunk left to split.
    pub fn split(&mut self, order: usize) -> Result<(), AllocError> {
        if order > MAX_ORDER {
            return Err(AllocError::OutOfMemory);
        }
        debug_assert!(order > MIN_ORDER, "cannot split below the minimum order");

        if self.inner.free_lists[order].is_none() {
            self.split(order + 1)?;
        }

        let pfn = self.pop(order).expect("split left no chunk to halve");
        let half = 1u64 << (order - 1);
        self.insert_node(pfn, order - 1);
        self.insert_node(pfn + half, order - 1);
        Ok(())
    }

    /// Coalesces the free chunk at `pfn` with its buddy as far up as the
    /// buddies allow, at most to [`MAX_ORDER`].
    ///
    /// The chunk must already sit in its free list. A no-op when the
    /// buddy is absent, allocated, of a different order, or in another
    /// region, so the operation is idempotent on a maximally-combined
    /// chunk.
    pub fn combine(&mut self, pfn: Pfn) {
        // Safety (all accesses below): region lock held.
        let mut pfn = pfn;
        let mut order = unsafe { self.nodes.node(pfn).order } as usize;

        while order < MAX_ORDER {
            let offset = pfn.offset_from(self.region_start);
            let buddy = self.region_start + (offset ^ (1u64 << order));
            if !self.nodes.contains(buddy) {
                break;
            }

            let b = unsafe { self.nodes.node(buddy) };
            if b.region != self.region_index || !b.head || b.allocated || b.order as usize != order
            {
                break;
            }

            self.remove_node(pfn, order);
            self.remove_node(buddy, order);
            let (low, high) = if buddy < pfn { (buddy, pfn) } else { (pfn, buddy) };
            unsafe { self.nodes.node_mut(high).head = false };
            self.insert_node(low, order + 1);

            pfn = low;
            order += 1;
        }
    }
}
