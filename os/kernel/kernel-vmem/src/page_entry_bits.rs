use bitfield_struct::bitfield;
use kernel_memory_addresses::{PageFrameNumber, PhysicalAddress, Size4M, PageSize};

/// A single 32-bit i386 paging entry in its raw bitfield form.
///
/// Directory entries and table entries share this layout. A directory entry
/// either points to a page table or, with `large_page` (PS) set, maps a
/// 4 MiB page directly. A table entry always maps one 4 KiB page.
///
/// ### Bit layout
///
/// | Bits  | Name / Mnemonic | Meaning |
/// |-------|-----------------|---------|
/// | 0     | `P` (present)   | Valid entry if set |
/// | 1     | `RW`            | Writable if set |
/// | 2     | `US`            | User-mode accessible if set |
/// | 3     | `PWT`           | Write-through caching |
/// | 4     | `PCD`           | Disable caching |
/// | 5     | `A`             | Accessed |
/// | 6     | `D`             | Dirty (leaf only) |
/// | 7     | `PS`            | 4 MiB page (directory entries only) |
/// | 8     | `G`             | Global (leaf only, needs CR4.PGE) |
/// | 9–11  | OS available    | Ignored by hardware |
/// | 12–31 | frame           | Physical frame number |
///
/// ### Example
/// ```rust
/// # use kernel_memory_addresses::PageFrameNumber;
/// # use kernel_vmem::PageEntryBits;
/// let e = PageEntryBits::new_kernel_rw().with_frame(PageFrameNumber::new(0x123));
/// assert!(e.present() && e.writable() && !e.user_access());
/// assert_eq!(e.into_bits(), 0x0012_3003);
/// ```
#[bitfield(u32)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    pub present: bool,

    /// Writable (RW, bit 1).
    ///
    /// Clear for read-only; supervisor writes are only blocked with CR0.WP.
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5), set by the CPU.
    pub accessed: bool,

    /// Dirty (D, bit 6), set by the CPU on the first write to a leaf.
    pub dirty: bool,

    /// Page Size (PS, bit 7).
    ///
    /// In a directory entry: the entry maps a 4 MiB page. Must be clear in
    /// table entries (the bit is PAT there).
    pub large_page: bool,

    /// Global (G, bit 8) — leaf only.
    ///
    /// The translation survives CR3 reloads when CR4.PGE is set.
    pub global_translation: bool,

    /// OS-available (bits 9..=11).
    #[bits(3)]
    pub os_available: u8,

    /// Physical frame number (bits 12..=31).
    #[bits(20)]
    frame_bits: u32,
}

impl PageEntryBits {
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> PageFrameNumber {
        PageFrameNumber::new(self.frame_bits())
    }

    #[inline]
    pub const fn set_frame(&mut self, frame: PageFrameNumber) {
        self.set_frame_bits(frame.as_u32());
    }

    #[inline]
    #[must_use]
    pub const fn with_frame(self, frame: PageFrameNumber) -> Self {
        self.with_frame_bits(frame.as_u32())
    }

    /// The flag bits alone, with the frame cleared.
    #[inline]
    #[must_use]
    pub const fn flags(self) -> Self {
        self.with_frame_bits(0)
    }

    /// Present, writable, supervisor-only.
    #[inline]
    #[must_use]
    pub const fn new_kernel_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// Present, writable, user-accessible.
    #[inline]
    #[must_use]
    pub const fn new_user_rw() -> Self {
        Self::new_kernel_rw().with_user_access(true)
    }
}

/// Decoded meaning of a present directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryEntryKind {
    /// Points to the page table in this frame.
    Table(PageFrameNumber),
    /// Maps the 4 MiB page starting at this address.
    Large4M(PhysicalAddress),
}

/// Page-directory entry (PDE).
#[repr(transparent)]
#[derive(Clone, Copy)]
pub struct DirectoryEntry(PageEntryBits);

impl DirectoryEntry {
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(PageEntryBits::new())
    }

    /// Entry pointing to the page table in `frame`.
    #[inline]
    #[must_use]
    pub const fn table(frame: PageFrameNumber, flags: PageEntryBits) -> Self {
        Self(
            flags
                .with_present(true)
                .with_large_page(false)
                .with_frame(frame),
        )
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(PageEntryBits::from_bits(bits))
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u32 {
        self.0.into_bits()
    }

    #[inline]
    #[must_use]
    pub const fn bits(&self) -> PageEntryBits {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.0.present()
    }

    /// `None` if the entry is not present.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> Option<DirectoryEntryKind> {
        if !self.0.present() {
            None
        } else if self.0.large_page() {
            let base = self.0.frame().base().as_u32() & !(Size4M::SIZE - 1);
            Some(DirectoryEntryKind::Large4M(PhysicalAddress::new(base)))
        } else {
            Some(DirectoryEntryKind::Table(self.0.frame()))
        }
    }
}

/// Page-table entry (PTE), always a 4 KiB leaf.
#[repr(transparent)]
#[derive(Clone, Copy)]
pub struct TableEntry(PageEntryBits);

impl TableEntry {
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(PageEntryBits::new())
    }

    /// Present mapping of `frame` with `flags`.
    #[inline]
    #[must_use]
    pub const fn page(frame: PageFrameNumber, flags: PageEntryBits) -> Self {
        Self(flags.with_present(true).with_frame(frame))
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(PageEntryBits::from_bits(bits))
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u32 {
        self.0.into_bits()
    }

    #[inline]
    #[must_use]
    pub const fn bits(&self) -> PageEntryBits {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.0.present()
    }

    /// The mapped frame, `None` if not present.
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> Option<PageFrameNumber> {
        if self.0.present() {
            Some(self.0.frame())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_positions_match_hardware() {
        assert_eq!(PageEntryBits::new().with_present(true).into_bits(), 1);
        assert_eq!(PageEntryBits::new().with_writable(true).into_bits(), 2);
        assert_eq!(PageEntryBits::new().with_user_access(true).into_bits(), 4);
        assert_eq!(PageEntryBits::new().with_write_through(true).into_bits(), 8);
        assert_eq!(PageEntryBits::new().with_cache_disabled(true).into_bits(), 16);
        assert_eq!(PageEntryBits::new().with_large_page(true).into_bits(), 128);
        assert_eq!(PageEntryBits::new().with_global_translation(true).into_bits(), 256);
    }

    #[test]
    fn frame_occupies_upper_twenty_bits() {
        let e = PageEntryBits::new().with_frame(PageFrameNumber::new(0xFFFFF));
        assert_eq!(e.into_bits(), 0xFFFF_F000);
        assert_eq!(e.frame(), PageFrameNumber::new(0xFFFFF));
        assert_eq!(e.flags().into_bits(), 0);
    }

    #[test]
    fn directory_entry_kinds() {
        assert_eq!(DirectoryEntry::empty().kind(), None);

        let table =
            DirectoryEntry::table(PageFrameNumber::new(0x112), PageEntryBits::new_kernel_rw());
        assert_eq!(table.into_bits(), 0x0011_2003);
        assert_eq!(
            table.kind(),
            Some(DirectoryEntryKind::Table(PageFrameNumber::new(0x112)))
        );

        let large = DirectoryEntry::from_bits(0x0040_0083);
        assert_eq!(
            large.kind(),
            Some(DirectoryEntryKind::Large4M(PhysicalAddress::new(0x0040_0000)))
        );
    }

    #[test]
    fn table_entry_frame_only_when_present() {
        let e = TableEntry::page(PageFrameNumber::new(7), PageEntryBits::new_kernel_rw());
        assert_eq!(e.frame(), Some(PageFrameNumber::new(7)));
        assert_eq!(TableEntry::from_bits(0x7000).frame(), None);
    }
}
