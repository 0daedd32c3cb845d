//! # Active address space
//!
//! [`Paging`] edits the directory and tables of the **active** address space
//! through the recursive window, so it never needs to know where the paging
//! structures live physically.
//!
//! ## Operations
//! - [`Paging::map`] / [`Paging::map_range`]: install 4 KiB leaf entries,
//!   creating missing page tables on demand from a [`FrameAlloc`].
//! - [`Paging::unmap`]: clear a leaf entry and return the frame it mapped.
//! - [`Paging::translate`]: software walk (4 KiB and 4 MiB leaves).
//! - [`Paging::invalidate`]: `invlpg` when available, CR3 reload otherwise.
//!
//! Mapping the null page, anything inside the recursive window, or a 4 MiB
//! page is a contract violation and panics.

use crate::recursive::{directory_entry_address, is_in_window, table_entry_address, table_window};
use crate::{DirectoryEntry, DirectoryEntryKind, FrameAlloc, Mmu, PageEntryBits, TableEntry};
use kernel_info::memory::ENTRIES_PER_TABLE;
use kernel_memory_addresses::{
    PageFrameNumber, PhysicalAddress, Size4K, Size4M, VirtualAddress, VirtualPageNumber,
};
use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("no physical frame available for a new page table")]
    OutOfPageTables,
}

/// Page-table editor for the active directory.
#[derive(Debug, Clone, Copy)]
pub struct Paging<M> {
    mmu: M,
}

impl<M: Mmu> Paging<M> {
    #[must_use]
    pub const fn new(mmu: M) -> Self {
        Self { mmu }
    }

    #[must_use]
    pub const fn mmu(&self) -> &M {
        &self.mmu
    }

    #[must_use]
    pub fn current_directory(&self) -> PhysicalAddress {
        self.mmu.current_directory()
    }

    #[inline]
    fn read_entry(&self, va: VirtualAddress) -> u32 {
        // SAFETY: the recursive window is always mapped; `Mmu` resolves it.
        unsafe { self.mmu.virt_to_ptr(va).cast::<u32>().read_volatile() }
    }

    #[inline]
    fn write_entry(&self, va: VirtualAddress, bits: u32) {
        // SAFETY: see `read_entry`.
        unsafe { self.mmu.virt_to_ptr(va).cast::<u32>().write_volatile(bits) }
    }

    /// Directory entry `index` of the active directory.
    #[must_use]
    pub fn directory_entry(&self, index: usize) -> DirectoryEntry {
        assert!(index < ENTRIES_PER_TABLE, "directory index {index} out of range");
        DirectoryEntry::from_bits(self.read_entry(directory_entry_address(index)))
    }

    pub fn set_directory_entry(&self, index: usize, entry: DirectoryEntry) {
        assert!(index < ENTRIES_PER_TABLE, "directory index {index} out of range");
        self.write_entry(directory_entry_address(index), entry.into_bits());
    }

    /// Entry `table` of the page table behind directory entry `directory`.
    ///
    /// The directory entry must be present; otherwise the access faults.
    #[must_use]
    pub fn table_entry(&self, directory: usize, table: usize) -> TableEntry {
        TableEntry::from_bits(self.read_entry(table_entry_address(directory, table)))
    }

    pub fn set_table_entry(&self, directory: usize, table: usize, entry: TableEntry) {
        self.write_entry(table_entry_address(directory, table), entry.into_bits());
    }

    /// Drop any cached translation for the page containing `va`.
    pub fn invalidate(&self, va: VirtualAddress) {
        if self.mmu.supports_invlpg() {
            self.mmu.invlpg(va);
        } else {
            // i386: reloading CR3 flushes all non-global entries.
            // SAFETY: reloading the active directory changes no translation.
            unsafe { self.mmu.load_directory(self.mmu.current_directory()) }
        }
    }

    /// Map `page` to `frame`.
    ///
    /// # Errors
    /// [`MapError::OutOfPageTables`] if a page table had to be created and
    /// `alloc` had no frame left. Nothing is changed in that case.
    ///
    /// # Panics
    /// For the null page, pages inside the recursive window, `large_page`
    /// in `flags`, and pages covered by an existing 4 MiB mapping.
    pub fn map<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        frame: PageFrameNumber,
        page: VirtualPageNumber,
        flags: PageEntryBits,
    ) -> Result<(), MapError> {
        let va = page.base();
        assert!(!va.is_null(), "refusing to map the null page");
        assert!(!flags.large_page(), "4 MiB mappings are not supported");
        assert!(
            !is_in_window(va),
            "{va} lies inside the recursive page-table window"
        );

        let (directory, table) = (va.directory_index(), va.table_index());
        match self.directory_entry(directory).kind() {
            None => self.install_table(alloc, directory, flags.user_access())?,
            Some(DirectoryEntryKind::Large4M(base)) => {
                panic!("{va} is already covered by the 4 MiB page at {base}")
            }
            Some(DirectoryEntryKind::Table(_)) => {}
        }

        self.set_table_entry(directory, table, TableEntry::page(frame, flags));
        self.invalidate(va);
        Ok(())
    }

    fn install_table<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        directory: usize,
        user: bool,
    ) -> Result<(), MapError> {
        let frame = alloc.alloc_4k().ok_or(MapError::OutOfPageTables)?;
        let flags = PageEntryBits::new_kernel_rw().with_user_access(user);
        self.set_directory_entry(directory, DirectoryEntry::table(frame, flags));

        // The window page for this table may still hold a stale translation.
        self.invalidate(table_window(directory));
        for table in 0..ENTRIES_PER_TABLE {
            self.set_table_entry(directory, table, TableEntry::empty());
        }

        trace!("page table {frame} installed at directory index {directory}");
        Ok(())
    }

    /// Map `count` consecutive pages starting at `page` to consecutive frames
    /// starting at `frame`.
    ///
    /// # Errors
    /// As [`map`](Self::map); pages mapped before the failure stay mapped.
    pub fn map_range<A: FrameAlloc + ?Sized>(
        &self,
        alloc: &mut A,
        frame: PageFrameNumber,
        page: VirtualPageNumber,
        count: u32,
        flags: PageEntryBits,
    ) -> Result<(), MapError> {
        for i in 0..count {
            self.map(alloc, frame + i, page + i, flags)?;
        }
        Ok(())
    }

    /// Remove the mapping of `page`, returning the frame it pointed to.
    ///
    /// Page tables are never freed.
    ///
    /// # Panics
    /// If `page` is covered by a 4 MiB mapping.
    pub fn unmap(&self, page: VirtualPageNumber) -> Option<PageFrameNumber> {
        let va = page.base();
        let (directory, table) = (va.directory_index(), va.table_index());
        match self.directory_entry(directory).kind()? {
            DirectoryEntryKind::Large4M(base) => {
                panic!("cannot unmap {va} from the 4 MiB page at {base}")
            }
            DirectoryEntryKind::Table(_) => {}
        }

        let frame = self.table_entry(directory, table).frame()?;
        self.set_table_entry(directory, table, TableEntry::empty());
        self.invalidate(va);
        Some(frame)
    }

    /// Translate `va` to the physical address it maps to, if any.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let directory = va.directory_index();
        match self.directory_entry(directory).kind()? {
            DirectoryEntryKind::Large4M(base) => Some(base + va.offset::<Size4M>()),
            DirectoryEntryKind::Table(_) => self
                .table_entry(directory, va.table_index())
                .frame()
                .map(|frame| frame.base() + va.offset::<Size4K>()),
        }
    }

    #[must_use]
    pub fn is_mapped(&self, page: VirtualPageNumber) -> bool {
        self.translate(page.base()).is_some()
    }
}
