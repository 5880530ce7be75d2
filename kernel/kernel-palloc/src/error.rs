/// Recoverable allocation failures.
///
/// These cover genuine resource exhaustion, which callers are expected to
/// handle (or to have a fallback chain for). Structural problems (a PFN
/// outside the managed range, a free-list entry that should exist but
/// does not, freeing a frame that is not an allocated chunk head) are
/// *not* represented here: those are programming errors and panic
/// immediately, since a corrupted buddy structure cannot be trusted to
/// self-heal.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AllocError {
    /// No region in the fallback chain has a chunk large enough.
    #[error("out of physical memory")]
    OutOfMemory,
    /// No region passes the requested tag policy at all.
    #[error("no region matches the requested tag policy")]
    NoMatchingRegion,
}
