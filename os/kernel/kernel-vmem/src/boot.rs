//! # Paging bring-up
//!
//! Builds the boot directory: the first MiB and the kernel image mapped at
//! `KERNEL_SPACE + physical`, the recursive entry pointing at the directory.

use crate::{DirectoryEntry, Mmu, PageEntryBits, PageTable, PhysMapper, TableEntry};
use kernel_info::boot::BootInfo;
use kernel_info::memory::{
    BOOT_MAPPED_SPAN, KERNEL_DIRECTORY_INDEX, LOW_MEMORY_END, RECURSIVE_ENTRY,
};
use kernel_memory_addresses::{PageFrameNumber, PhysicalAddress};
use log::info;

/// The two frames the boot directory is built in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootTables {
    pub directory: PageFrameNumber,
    pub kernel_table: PageFrameNumber,
}

/// Build the boot directory, load it and enable paging.
///
/// # Safety
/// - `phys` must give exclusive, writable access to both frames of `tables`.
/// - The running code and stack must be inside the kernel image, which must
///   be linked at `KERNEL_SPACE + physical load address`.
///
/// # Panics
/// If the kernel image does not fit the span of the first kernel page table.
pub unsafe fn paging_boot_init<P, M>(phys: &P, mmu: &M, tables: BootTables, info: &BootInfo)
where
    P: PhysMapper + ?Sized,
    M: Mmu + ?Sized,
{
    assert!(
        info.kernel_end.as_u32() <= BOOT_MAPPED_SPAN,
        "kernel image ends at {}, past the first kernel page table",
        info.kernel_end
    );

    // SAFETY: caller guarantees exclusive access to both frames.
    let directory: &mut PageTable = unsafe { phys.phys_to_mut(tables.directory.base()) };
    let table: &mut PageTable = unsafe { phys.phys_to_mut(tables.kernel_table.base()) };
    directory.zero();
    table.zero();

    let flags = PageEntryBits::new_kernel_rw();
    let low_memory = 0..PhysicalAddress::new(LOW_MEMORY_END).frame().as_u32();
    let image = info.kernel_first_frame().as_u32()..=info.kernel_last_frame().as_u32();
    for frame in low_memory.chain(image) {
        // Below 4 MiB the table index equals the frame number.
        table.set_table_entry(frame as usize, TableEntry::page(PageFrameNumber::new(frame), flags));
    }

    directory.set_directory_entry(
        KERNEL_DIRECTORY_INDEX,
        DirectoryEntry::table(tables.kernel_table, flags),
    );
    directory.set_directory_entry(
        RECURSIVE_ENTRY,
        DirectoryEntry::table(tables.directory, flags),
    );

    // SAFETY: the new directory maps the kernel image at its link address.
    unsafe {
        mmu.load_directory(tables.directory.base());
        mmu.enable_paging();
    }

    info!(
        "paging enabled: directory {}, kernel table {}",
        tables.directory.base(),
        tables.kernel_table.base()
    );
}
