/// Process-wide page counters.
///
/// Guarded by their own lock, disjoint from every region lock; the region
/// lock is never held while the counters are updated.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PageStats {
    /// Frames handed to the allocator at init.
    pub num_pages_total: u64,
    /// Frames currently allocated.
    pub num_pages_alloc: u64,
}
