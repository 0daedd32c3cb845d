//! # Memory Layout
//!
//! Compile-time layout of the 32-bit address space.
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │         User Space              │
//! KERNEL_SPACE├─────────────────────────────────┤ 0xC000_0000 (PDE 768)
//!             │  Kernel image + first MiB       │
//!             │  Boot-allocated pages, slabs    │
//!             │  (kernel virtual regions)       │
//! RECURSIVE_  ├─────────────────────────────────┤ 0xFFC0_0000 (PDE 1023)
//!   WINDOW    │  Page tables of this directory  │
//!             │  (the directory at 0xFFFF_F000) │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```

/// First virtual address of the kernel part of every address space.
///
/// The kernel image is linked at `KERNEL_SPACE + physical load address`.
pub const KERNEL_SPACE: u32 = 0xC000_0000;

/// Directory index of the first kernel page table.
pub const KERNEL_DIRECTORY_INDEX: usize = (KERNEL_SPACE >> 22) as usize;

/// Directory index that points back at the directory itself.
pub const RECURSIVE_ENTRY: usize = 1023;

/// Base of the 4 MiB window through which all page tables of the active
/// directory are visible (`RECURSIVE_ENTRY * 4 MiB`).
#[allow(clippy::cast_possible_truncation)] // 1023
pub const RECURSIVE_WINDOW: u32 = (RECURSIVE_ENTRY as u32) << 22;

/// Virtual address of the active page directory itself.
#[allow(clippy::cast_possible_truncation)] // 1023
pub const RECURSIVE_DIRECTORY: u32 = RECURSIVE_WINDOW + ((RECURSIVE_ENTRY as u32) << 12);

/// Number of entries in a directory or table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Low physical memory (BIOS, VGA, legacy DMA) that is never handed out.
pub const LOW_MEMORY_END: u32 = 0x0010_0000; // 1 MiB

/// Where the kernel image is placed in *physical* memory.
pub const PHYS_LOAD: u32 = 0x0010_0000; // 1 MiB

/// Span mapped by the first kernel page table at boot.
///
/// The kernel image, the page-descriptor table and the seed slabs must live
/// inside `[KERNEL_SPACE, KERNEL_SPACE + BOOT_MAPPED_SPAN)`.
pub const BOOT_MAPPED_SPAN: u32 = 4 * 1024 * 1024;

const _: () = {
    assert!(KERNEL_SPACE.is_multiple_of(4 * 1024 * 1024));
    assert!(KERNEL_DIRECTORY_INDEX < RECURSIVE_ENTRY);
    assert!(RECURSIVE_DIRECTORY == 0xFFFF_F000);
    assert!(PHYS_LOAD >= LOW_MEMORY_END);
};
