use crate::MAX_REGIONS;
use core::ptr::NonNull;
use kernel_memory_addresses::Pfn;

/// Per-frame allocator bookkeeping.
///
/// One `FrameNode` exists for every frame in the managed PFN range, in a
/// table indexed by PFN offset from the table base. Fields are named
/// integers of minimal-but-sufficient width rather than a packed machine
/// word.
///
/// Exactly one of the following holds for any frame:
/// - it is the head of a free chunk (`head && !allocated`, linked into a
///   free list via `next`),
/// - it is the head of an allocated chunk (`head && allocated`),
/// - it is an interior frame of a larger chunk (`!head`),
/// - it lies outside every region (`!head`, never touched after init).
///
/// `order` and `next` are only meaningful for chunk heads.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameNode {
    /// Buddy order of the chunk this frame heads.
    pub order: u8,
    /// Index of the owning region in the region table.
    pub region: u8,
    /// Chunk is currently handed out (vs. sitting in a free list).
    pub allocated: bool,
    /// Frame is a valid chunk head (not an interior frame).
    pub head: bool,
    /// Intrusive free-list link to the next chunk head of the same order.
    pub next: Option<Pfn>,
}

impl FrameNode {
    /// A node describing a frame no region has claimed.
    #[must_use]
    pub const fn unused() -> Self {
        Self {
            order: 0,
            region: 0,
            allocated: false,
            head: false,
            next: None,
        }
    }
}

/// The node table: one [`FrameNode`] per managed frame, over storage the
/// caller carved out before the allocator existed.
///
/// The table is shared by all regions, but every frame belongs to exactly
/// one region and is only ever mutated under that region's lock (or
/// during single-threaded init). That discipline, not this type, is what
/// makes the aliasing sound; the `unsafe` accessors spell it out.
pub(crate) struct NodeTable {
    nodes: NonNull<FrameNode>,
    base: Pfn,
    len: usize,
}

// Safety: the raw pointer is only dereferenced under the owning region's
// lock (see accessor contracts), so the table may be shared freely.
unsafe impl Send for NodeTable {}
unsafe impl Sync for NodeTable {}

impl NodeTable {
    /// Wraps `len` initialized nodes starting at `nodes`, where node `i`
    /// describes frame `base + i`.
    ///
    /// # Safety
    ///
    /// `nodes` must point to `len` initialized `FrameNode`s that stay
    /// valid and exclusive to this table for its whole lifetime.
    pub unsafe fn from_raw(nodes: NonNull<FrameNode>, base: Pfn, len: usize) -> Self {
        Self { nodes, base, len }
    }

    /// First managed PFN.
    pub const fn base(&self) -> Pfn {
        self.base
    }

    /// Number of managed frames.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether `pfn` has a node in this table.
    pub const fn contains(&self, pfn: Pfn) -> bool {
        pfn.as_u64() >= self.base.as_u64() && pfn.as_u64() < self.base.as_u64() + self.len as u64
    }

    /// Table index for `pfn`; panics on an unmanaged PFN (programming
    /// error, the caller computed a frame outside every region).
    fn index_of(&self, pfn: Pfn) -> usize {
        assert!(
            self.contains(pfn),
            "PFN {pfn} outside the managed range [{}, {})",
            self.base,
            self.base + self.len as u64,
        );
        pfn.offset_from(self.base) as usize
    }

    /// Reads the node for `pfn`.
    ///
    /// # Safety
    ///
    /// The caller must hold the lock of the region owning `pfn`, or have
    /// exclusive access to the whole allocator (init), or own `pfn` as an
    /// allocated chunk head (whose fields nobody else touches).
    pub unsafe fn node(&self, pfn: Pfn) -> FrameNode {
        let idx = self.index_of(pfn);
        // Safety: in-bounds by `index_of`; no concurrent writer per the
        // caller contract.
        unsafe { *self.nodes.as_ptr().add(idx) }
    }

    /// Mutable access to the node for `pfn`.
    ///
    /// # Safety
    ///
    /// Same contract as [`Self::node`], and the returned reference must
    /// not outlive the caller's lock scope.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn node_mut(&self, pfn: Pfn) -> &mut FrameNode {
        let idx = self.index_of(pfn);
        // Safety: in-bounds by `index_of`; exclusivity per the caller
        // contract.
        unsafe { &mut *self.nodes.as_ptr().add(idx) }
    }
}

// Region indices are stored in a u8.
const _: () = assert!(MAX_REGIONS <= u8::MAX as usize + 1);
