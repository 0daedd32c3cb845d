//! The real MMU of a 32-bit x86 CPU.

use crate::Mmu;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_registers::cr0::Cr0;
use kernel_registers::cr3::Cr3;
use kernel_registers::cr4::Cr4;
use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};

/// Paging hardware of the running CPU.
#[derive(Debug, Clone, Copy)]
pub struct X86Mmu {
    has_invlpg: bool,
    has_global_pages: bool,
}

impl X86Mmu {
    /// `has_invlpg` comes from CPU detection; the i386 lacks the instruction.
    #[must_use]
    pub const fn new(has_invlpg: bool) -> Self {
        Self {
            has_invlpg,
            has_global_pages: false,
        }
    }

    /// Honor the global bit of kernel mappings (CPUID `PGE`).
    #[must_use]
    pub const fn with_global_pages(mut self, enabled: bool) -> Self {
        self.has_global_pages = enabled;
        self
    }
}

unsafe impl Mmu for X86Mmu {
    #[inline]
    fn virt_to_ptr(&self, va: VirtualAddress) -> *mut u8 {
        core::ptr::with_exposed_provenance_mut(va.as_usize())
    }

    #[inline]
    fn supports_invlpg(&self) -> bool {
        self.has_invlpg
    }

    #[inline]
    fn invlpg(&self, va: VirtualAddress) {
        unsafe {
            core::arch::asm!("invlpg [{}]", in(reg) va.as_u32(), options(nostack, preserves_flags));
        }
    }

    fn current_directory(&self) -> PhysicalAddress {
        unsafe { Cr3::load_unsafe() }.directory()
    }

    unsafe fn load_directory(&self, directory: PhysicalAddress) {
        unsafe { Cr3::from_directory(directory).store_unsafe() }
    }

    unsafe fn enable_paging(&self) {
        if self.has_global_pages {
            unsafe { Cr4::load_unsafe().with_pge(true).store_unsafe() };
        }
        unsafe {
            Cr0::load_unsafe()
                .with_pe_protection_enable(true)
                .with_pg_paging(true)
                .store_unsafe();
        }
    }
}
