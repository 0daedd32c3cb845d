//! # Recursive Page-Directory Window
//!
//! Directory entry [`RECURSIVE_ENTRY`] (1023) points at the directory itself.
//! A walk through it lands one level "too high", so the last 4 MiB of the
//! address space show every page table of the active directory, and the last
//! page of that window shows the directory:
//!
//! ```text
//! 0xFFC0_0000 + 4096 * d          page table for directory index d
//! 0xFFC0_0000 + 4096 * d + 4 * t  entry t of that table
//! 0xFFFF_F000 + 4 * d             directory entry d
//! ```

use kernel_info::memory::{RECURSIVE_DIRECTORY, RECURSIVE_ENTRY, RECURSIVE_WINDOW};
use kernel_memory_addresses::VirtualAddress;

const ENTRY_SIZE: u32 = 4;

/// Where directory entry `index` is visible.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)] // index < 1024
pub const fn directory_entry_address(index: usize) -> VirtualAddress {
    debug_assert!(index <= RECURSIVE_ENTRY);
    VirtualAddress::new(RECURSIVE_DIRECTORY + index as u32 * ENTRY_SIZE)
}

/// Where the page table for directory index `directory` is visible.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)] // directory < 1024
pub const fn table_window(directory: usize) -> VirtualAddress {
    debug_assert!(directory <= RECURSIVE_ENTRY);
    VirtualAddress::new(RECURSIVE_WINDOW + ((directory as u32) << 12))
}

/// Where entry `table` of the page table for `directory` is visible.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)] // table < 1024
pub const fn table_entry_address(directory: usize, table: usize) -> VirtualAddress {
    debug_assert!(table <= RECURSIVE_ENTRY);
    VirtualAddress::new(table_window(directory).as_u32() + table as u32 * ENTRY_SIZE)
}

/// Whether `va` lies in the window (and therefore may never be mapped explicitly).
#[inline]
#[must_use]
pub const fn is_in_window(va: VirtualAddress) -> bool {
    va.as_u32() >= RECURSIVE_WINDOW
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_entries_live_in_last_page() {
        assert_eq!(directory_entry_address(0), VirtualAddress::new(0xFFFF_F000));
        assert_eq!(directory_entry_address(768), VirtualAddress::new(0xFFFF_FC00));
        assert_eq!(directory_entry_address(1023), VirtualAddress::new(0xFFFF_FFFC));
    }

    #[test]
    fn table_entries_follow_directory_index() {
        assert_eq!(table_window(0), VirtualAddress::new(0xFFC0_0000));
        assert_eq!(table_entry_address(768, 0), VirtualAddress::new(0xFFF0_0000));
        assert_eq!(table_entry_address(768, 5), VirtualAddress::new(0xFFF0_0014));
        // The window of the recursive slot is the directory itself.
        assert_eq!(table_window(RECURSIVE_ENTRY).as_u32(), RECURSIVE_DIRECTORY);
    }

    #[test]
    fn entry_address_of_any_va() {
        let va = VirtualAddress::new(0xC012_3456);
        let pte = table_entry_address(va.directory_index(), va.table_index());
        assert_eq!(pte, VirtualAddress::new(0xFFF0_048C));
    }

    #[test]
    fn window_bounds() {
        assert!(!is_in_window(VirtualAddress::new(0xFFBF_FFFF)));
        assert!(is_in_window(VirtualAddress::new(0xFFC0_0000)));
        assert!(is_in_window(VirtualAddress::new(0xFFFF_FFFF)));
    }
}
