//! # Virtual Memory Support
//!
//! 32-bit (i386) two-level paging for the kernel.
//!
//! ## What you get
//! - [`PageEntryBits`], [`DirectoryEntry`] and [`TableEntry`]: the hardware
//!   entry format.
//! - [`recursive`]: where directory and table entries are visible once the
//!   directory maps itself at index 1023.
//! - [`Paging`]: map/unmap/translate in the **active** address space,
//!   creating page tables on demand.
//! - [`paging_boot_init`]: builds the boot directory and turns paging on.
//! - [`Mmu`]: the seam to the CPU (or to a [`testing::SimulatedMachine`]).
//! - A tiny allocator/mapper interface ([`FrameAlloc`], [`PhysMapper`]).
//!
//! ## i386 Virtual Address → Physical Address Walk
//!
//! ```text
//! | 31‒22     | 21‒12 | 11‒0   |
//! | Directory | Table | Offset |
//! ```
//!
//! ```text
//!  CR3 → Directory ──PDE──► Table ──PTE──► 4 KiB page
//!                    └─ PS=1 ─────────────► 4 MiB page
//! ```
//!
//! Each level holds 1024 entries of 4 bytes. A directory entry with `PS=1`
//! maps a 4 MiB page directly; this kernel never creates such entries and
//! treats finding one where it wants to map as a bug.
//!
//! ## The Recursive Entry
//!
//! Directory entry 1023 points at the directory frame. After that, the page
//! table for directory index `d` is readable at `0xFFC0_0000 + d * 4096` and
//! the directory itself at `0xFFFF_F000`, so page tables are edited with
//! ordinary memory accesses and their physical location never matters.

#![cfg_attr(not(any(test, doctest, feature = "testing")), no_std)]
#![allow(unsafe_code)]

pub mod address_space;
mod boot;
mod mmu;
mod page_entry_bits;
mod page_table;
pub mod recursive;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
#[cfg(target_arch = "x86")]
mod x86;

#[cfg(any(test, feature = "testing"))]
extern crate alloc;

pub use crate::address_space::{MapError, Paging};
pub use crate::boot::{BootTables, paging_boot_init};
pub use crate::mmu::Mmu;
pub use crate::page_entry_bits::{DirectoryEntry, DirectoryEntryKind, PageEntryBits, TableEntry};
pub use crate::page_table::PageTable;
#[cfg(target_arch = "x86")]
pub use crate::x86::X86Mmu;

use kernel_memory_addresses::{PageFrameNumber, PhysicalAddress};

/// Re-export constants as info module.
pub use kernel_info::memory as info;

/// Minimal allocator that hands out **4 KiB physical frames** for page tables.
pub trait FrameAlloc {
    /// Allocate one 4 KiB frame, or `None` when exhausted.
    fn alloc_4k(&mut self) -> Option<PageFrameNumber>;
}

impl<A: FrameAlloc + ?Sized> FrameAlloc for &mut A {
    #[inline]
    fn alloc_4k(&mut self) -> Option<PageFrameNumber> {
        (**self).alloc_4k()
    }
}

/// Minimal "physical memory mapper" used before paging is on.
///
/// Before CR0.PG is set the CPU uses physical addresses directly, and boot
/// code needs to treat a physical frame as a typed Rust object.
pub trait PhysMapper {
    /// Map a **physical** address to a mutable reference of type `T`.
    ///
    /// # Safety
    /// The caller must ensure the physical address is valid, writable, not
    /// aliased elsewhere, and that `T` fits within the frame at `pa`.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}
