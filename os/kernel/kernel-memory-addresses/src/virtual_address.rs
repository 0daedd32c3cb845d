use crate::{PageSize, Size4K, Size4M, VirtualPageNumber};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Virtual memory address (32-bit).
///
/// The address splits into the directory index (bits 31–22), the table
/// index (bits 21–12) and the in-page offset (bits 11–0):
///
/// ```text
/// | 31‒22 | 21‒12 | 11‒0   |
/// |  PD   |  PT   | Offset |
/// ```
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0xC010_2345);
/// assert_eq!(va.directory_index(), 768);
/// assert_eq!(va.table_index(), 0x102);
/// assert_eq!(va.offset::<Size4K>(), 0x345);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u32);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// The 4 KiB virtual page containing this address.
    #[inline]
    #[must_use]
    pub const fn page(self) -> VirtualPageNumber {
        VirtualPageNumber::new(self.0 >> Size4K::SHIFT)
    }

    /// Index of the page-directory entry covering this address (0..1024).
    #[inline]
    #[must_use]
    pub const fn directory_index(self) -> usize {
        (self.0 >> Size4M::SHIFT) as usize
    }

    /// Index of the page-table entry covering this address (0..1024).
    #[inline]
    #[must_use]
    pub const fn table_index(self) -> usize {
        ((self.0 >> Size4K::SHIFT) & 0x3FF) as usize
    }

    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> u32 {
        self.0 & (S::SIZE - 1)
    }

    #[inline]
    #[must_use]
    pub const fn align_down<S: PageSize>(self) -> Self {
        Self(self.0 & !(S::SIZE - 1))
    }

    #[inline]
    #[must_use]
    pub const fn align_up<S: PageSize>(self) -> Self {
        Self(crate::align_up(self.0, S::SIZE))
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned<S: PageSize>(self) -> bool {
        self.offset::<S>() == 0
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:08X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for VirtualAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl From<VirtualPageNumber> for VirtualAddress {
    #[inline]
    fn from(value: VirtualPageNumber) -> Self {
        value.base()
    }
}

impl Add<u32> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u32> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}
