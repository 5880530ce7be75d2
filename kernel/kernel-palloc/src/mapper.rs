//! Physical-address-to-pointer translation seam.
//!
//! The allocator itself deals in PFNs and physical addresses; the
//! pointer-flavored convenience API needs a way to turn a physical
//! address into something dereferenceable. How that works depends on the
//! kernel's mapping strategy (direct map, identity map, test arena), so
//! it is abstracted behind [`PhysMapper`].

use core::ptr::NonNull;
use kernel_memory_addresses::PhysicalAddress;

/// Converts between physical addresses and kernel-visible pointers.
pub trait PhysMapper {
    /// A pointer through which `pa` can be accessed.
    ///
    /// The mapping must cover the full range the caller intends to touch;
    /// that is a property of the kernel's address-space setup, not of
    /// this trait.
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> NonNull<u8>;

    /// The physical address behind a pointer previously produced by
    /// [`Self::phys_to_ptr`].
    fn ptr_to_phys(&self, ptr: NonNull<u8>) -> PhysicalAddress;
}

/// [`PhysMapper`] for kernels with a direct map: every physical address
/// is visible at `offset + pa`.
pub struct OffsetMapper {
    offset: usize,
}

impl OffsetMapper {
    #[must_use]
    pub const fn new(offset: usize) -> Self {
        Self { offset }
    }
}

#[allow(clippy::cast_possible_truncation)]
impl PhysMapper for OffsetMapper {
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> NonNull<u8> {
        let va = self.offset.wrapping_add(pa.as_u64() as usize);
        NonNull::new(va as *mut u8).expect("direct mapping produced a null pointer")
    }

    fn ptr_to_phys(&self, ptr: NonNull<u8>) -> PhysicalAddress {
        PhysicalAddress::new((ptr.as_ptr() as usize - self.offset) as u64)
    }
}
