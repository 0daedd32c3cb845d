//! # Kernel Boot Information

use crate::memory::{BOOT_MAPPED_SPAN, KERNEL_SPACE};
use kernel_memory_addresses::{
    PageFrameNumber, PhysicalAddress, Size4K, VirtualAddress, VirtualPageNumber,
};

/// What the boot stub knows when it hands over to memory management.
///
/// Keep this `#[repr(C)]`; the assembly entry code fills it in.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BootInfo {
    /// Last usable physical frame (inclusive).
    pub last_frame: PageFrameNumber,

    /// Physical address of the first byte of the kernel image.
    pub kernel_start: PhysicalAddress,

    /// Physical address one past the last byte of the kernel image.
    pub kernel_end: PhysicalAddress,

    /// Last virtual page the kernel may hand out as a region (inclusive).
    pub heap_last_page: VirtualPageNumber,
}

impl BootInfo {
    /// Boot information for `memory_bytes` of RAM starting at physical 0.
    ///
    /// The kernel heap defaults to the span of the first kernel page table.
    #[must_use]
    pub const fn new(
        memory_bytes: u32,
        kernel_start: PhysicalAddress,
        kernel_end: PhysicalAddress,
    ) -> Self {
        Self {
            last_frame: PhysicalAddress::new(memory_bytes - 1).frame(),
            kernel_start,
            kernel_end,
            heap_last_page: VirtualAddress::new(KERNEL_SPACE + BOOT_MAPPED_SPAN - 1).page(),
        }
    }

    /// Extends (or shrinks) the kernel heap to end right before `end`.
    #[must_use]
    pub const fn with_heap_end(mut self, end: VirtualAddress) -> Self {
        self.heap_last_page = VirtualAddress::new(end.as_u32() - 1).page();
        self
    }

    /// Virtual address at which the kernel image starts.
    #[must_use]
    pub const fn kernel_virtual_start(&self) -> VirtualAddress {
        VirtualAddress::new(KERNEL_SPACE + self.kernel_start.as_u32())
    }

    /// Virtual address one past the kernel image.
    #[must_use]
    pub const fn kernel_virtual_end(&self) -> VirtualAddress {
        VirtualAddress::new(KERNEL_SPACE + self.kernel_end.as_u32())
    }

    /// First frame of the kernel image.
    #[must_use]
    pub const fn kernel_first_frame(&self) -> PageFrameNumber {
        self.kernel_start.frame()
    }

    /// Last frame touched by the kernel image (inclusive).
    #[must_use]
    pub const fn kernel_last_frame(&self) -> PageFrameNumber {
        PhysicalAddress::new(self.kernel_end.as_u32() - 1).frame()
    }

    /// First frame after the kernel image; the boot frame allocator starts here.
    #[must_use]
    pub const fn first_free_frame(&self) -> PageFrameNumber {
        self.kernel_end.align_up::<Size4K>().frame()
    }

    /// First virtual page after the kernel image; the boot page allocator starts here.
    #[must_use]
    pub const fn first_free_page(&self) -> VirtualPageNumber {
        VirtualAddress::new(KERNEL_SPACE + self.kernel_end.align_up::<Size4K>().as_u32()).page()
    }
}
