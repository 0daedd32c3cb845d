//! # Virtual and Physical Memory Address Types (32-bit)
//!
//! Strongly typed wrappers for raw memory addresses and page numbers used in
//! paging and memory management code of a 32-bit (i386) kernel.
//!
//! ## Overview
//!
//! The types prevent mixing virtual and physical values at compile time while
//! remaining zero-cost wrappers around `u32`:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`PhysicalAddress`] | A physical byte address (RAM or MMIO). |
//! | [`VirtualAddress`] | A virtual byte address, translated by the page tables. |
//! | [`PageFrameNumber`] | A physical address shifted right by 12 (PPN). |
//! | [`VirtualPageNumber`] | A virtual address shifted right by 12 (VPN). |
//!
//! ## Page Sizes
//!
//! Two-level paging knows two page sizes, exposed as [`PageSize`] markers:
//!
//! - [`Size4K`] — 4 KiB pages mapped by a page-table entry
//! - [`Size4M`] — 4 MiB pages mapped directly by a directory entry (`PS=1`)
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0xC000_1234);
//! let page = va.page();
//! assert_eq!(page.base() + va.offset::<Size4K>(), va);
//!
//! let pa = PhysicalAddress::new(0x0030_0042);
//! assert_eq!(pa.frame().base() + pa.offset::<Size4K>(), pa);
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` and implement `Copy`, `Eq`, `Ord`, and
//!   `Hash`, so they can be stored in `#[repr(C)]` records as plain `u32`s.
//! - All alignment and offset calculations are `const fn`.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use page_size::{
    PAGE_SHIFT, PAGE_SIZE, PageSize, Size4K, Size4M, align_down, align_up, pages_for,
};
pub use physical_address::PhysicalAddress;
pub use physical_page::PageFrameNumber;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPageNumber;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_4k() {
        let a = PhysicalAddress::new(0x1234_5678);
        let frame = a.frame();
        assert_eq!(frame.base().as_u32() & 0xFFF, 0);
        assert_eq!(a.offset::<Size4K>(), 0x678);
        assert_eq!(frame.base() + a.offset::<Size4K>(), a);
    }

    #[test]
    fn split_4m() {
        let a = VirtualAddress::new(0xC07F_F123);
        assert_eq!(a.align_down::<Size4M>(), VirtualAddress::new(0xC040_0000));
        assert_eq!(a.offset::<Size4M>(), 0x3F_F123);
    }

    #[test]
    fn directory_and_table_indices() {
        let va = VirtualAddress::new(0xFFFF_F004);
        assert_eq!(va.directory_index(), 1023);
        assert_eq!(va.table_index(), 1023);
        assert_eq!(va.offset::<Size4K>(), 4);

        let va = VirtualAddress::new(0xC000_0000);
        assert_eq!(va.directory_index(), 768);
        assert_eq!(va.table_index(), 0);
    }

    #[test]
    fn page_numbers_round_trip_through_addresses() {
        let vpn = VirtualPageNumber::new(0xC0123);
        assert_eq!(vpn.base().page(), vpn);
        assert_eq!(vpn + 5 - vpn, 5);

        let ppn = PageFrameNumber::new(0x3FF);
        assert_eq!(PageFrameNumber::containing(ppn.base() + 0xABC), ppn);
    }

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_down(0x12345, 4096), 0x12000);
        assert_eq!(align_up(0x12345, 4096), 0x13000);
        assert_eq!(align_up(0x13000, 4096), 0x13000);
        assert_eq!(pages_for(0), 0);
        assert_eq!(pages_for(1), 1);
        assert_eq!(pages_for(4097), 2);
        assert_eq!(PhysicalAddress::new(0x1001).align_up::<Size4K>(), PhysicalAddress::new(0x2000));
        assert!(PhysicalAddress::new(0x40_0000).is_aligned::<Size4M>());
    }

    #[test]
    fn order_alignment() {
        assert!(PageFrameNumber::new(0).is_aligned_to_order(9));
        assert!(PageFrameNumber::new(16).is_aligned_to_order(4));
        assert!(!PageFrameNumber::new(24).is_aligned_to_order(4));
        assert!(PageFrameNumber::new(24).is_aligned_to_order(3));
    }
}
