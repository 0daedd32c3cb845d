//! # Higher-half physical mapper
//!
//! Before paging is on, the kernel runs from its higher-half link address
//! through a segment offset or an identity window set up by the loader; the
//! physical frames right behind the image are reachable at
//! `KERNEL_SPACE + pa`. [`HigherHalfMapper`] is the [`PhysMapper`] the boot
//! path uses to build the first directory and kernel table there.
//!
//! Once paging is on, physical memory is no longer reachable this way
//! outside the first [`BOOT_MAPPED_SPAN`] bytes; everything goes through
//! the recursive self-map.

use kernel_info::memory::{BOOT_MAPPED_SPAN, KERNEL_SPACE};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::PhysMapper;

/// Kernel address of the physical address `pa` in the boot mapping.
///
/// # Panics
/// If `pa` lies outside the boot-mapped span.
#[must_use]
pub const fn virtual_address(pa: PhysicalAddress) -> VirtualAddress {
    assert!(
        pa.as_u32() < BOOT_MAPPED_SPAN,
        "physical address outside the boot mapping"
    );
    VirtualAddress::new(KERNEL_SPACE + pa.as_u32())
}

/// [`PhysMapper`] over the higher-half boot mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct HigherHalfMapper;

impl PhysMapper for HigherHalfMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = virtual_address(pa).as_usize() as *mut T;
        // SAFETY: the caller guarantees the frame is mapped, writable and
        // not aliased.
        unsafe { &mut *va }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_kernel_space() {
        let va = virtual_address(PhysicalAddress::new(0x0011_0000));
        assert_eq!(va.as_u32(), 0xC011_0000);
    }

    #[test]
    #[should_panic(expected = "outside the boot mapping")]
    fn rejects_frames_past_the_boot_span() {
        let _ = virtual_address(PhysicalAddress::new(BOOT_MAPPED_SPAN));
    }
}
