//! # The hardware seam
//!
//! Everything paging code needs from the CPU: dereference a virtual address
//! under the active translation, invalidate a TLB entry, and read/write the
//! directory base and the paging-enable flag.

use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Access to the MMU of the running CPU (or a simulation of one).
///
/// # Safety
/// [`virt_to_ptr`](Mmu::virt_to_ptr) must return a pointer through which the
/// page containing `va` can be read and written under the active
/// translation, exactly as the CPU would resolve it. Accessing an unmapped
/// address is a page fault and must not silently succeed.
pub unsafe trait Mmu {
    /// Pointer to the byte at `va` in the active address space.
    fn virt_to_ptr(&self, va: VirtualAddress) -> *mut u8;

    /// Whether the CPU implements `invlpg` (i486 and later).
    fn supports_invlpg(&self) -> bool;

    /// Drop the TLB entry for the page containing `va`.
    fn invlpg(&self, va: VirtualAddress);

    /// Physical address of the active page directory (CR3).
    fn current_directory(&self) -> PhysicalAddress;

    /// Make `directory` the active page directory; flushes the TLB.
    ///
    /// # Safety
    /// `directory` must hold a valid directory that maps the running code,
    /// the stack, and all kernel data that is about to be accessed.
    unsafe fn load_directory(&self, directory: PhysicalAddress);

    /// Set CR0.PG (and PE).
    ///
    /// # Safety
    /// A valid directory must be loaded.
    unsafe fn enable_paging(&self);
}

unsafe impl<T: Mmu + ?Sized> Mmu for &T {
    #[inline]
    fn virt_to_ptr(&self, va: VirtualAddress) -> *mut u8 {
        (**self).virt_to_ptr(va)
    }

    #[inline]
    fn supports_invlpg(&self) -> bool {
        (**self).supports_invlpg()
    }

    #[inline]
    fn invlpg(&self, va: VirtualAddress) {
        (**self).invlpg(va);
    }

    #[inline]
    fn current_directory(&self) -> PhysicalAddress {
        (**self).current_directory()
    }

    #[inline]
    unsafe fn load_directory(&self, directory: PhysicalAddress) {
        unsafe { (**self).load_directory(directory) }
    }

    #[inline]
    unsafe fn enable_paging(&self) {
        unsafe { (**self).enable_paging() }
    }
}
