//! # Page Directory / Page Table frames
//!
//! Both levels are a 4 KiB frame holding 1024 32-bit entries. This type is
//! only used while paging is being set up, when the frames are reached
//! through a [`PhysMapper`](crate::PhysMapper). Afterwards every entry is
//! edited through the recursive window.

use crate::{DirectoryEntry, PageEntryBits, TableEntry};
use kernel_info::memory::ENTRIES_PER_TABLE;

#[repr(C, align(4096))]
pub struct PageTable {
    entries: [u32; ENTRIES_PER_TABLE],
}

impl PageTable {
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(0);
    }

    #[inline]
    #[must_use]
    pub const fn entry_bits(&self, index: usize) -> PageEntryBits {
        PageEntryBits::from_bits(self.entries[index])
    }

    #[inline]
    pub const fn set_directory_entry(&mut self, index: usize, entry: DirectoryEntry) {
        self.entries[index] = entry.into_bits();
    }

    #[inline]
    pub const fn set_table_entry(&mut self, index: usize, entry: TableEntry) {
        self.entries[index] = entry.into_bits();
    }
}

const _: () = assert!(size_of::<PageTable>() == 4096);
