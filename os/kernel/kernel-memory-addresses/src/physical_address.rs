use crate::{PageFrameNumber, PageSize, Size4K};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Physical memory address (32-bit, no PAE).
///
/// Denotes **physical** addresses (RAM / MMIO) and carries that intent at the
/// type level so a page-table frame is never confused with a kernel pointer.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x0012_3456);
/// assert_eq!(pa.frame().as_u32(), 0x123);
/// assert_eq!(pa.offset::<Size4K>(), 0x456);
/// assert_eq!(pa.frame().base() + pa.offset::<Size4K>(), pa);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u32);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(v)
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

    /// The 4 KiB frame containing this address.
    #[inline]
    #[must_use]
    pub const fn frame(self) -> PageFrameNumber {
        PageFrameNumber::new(self.0 >> Size4K::SHIFT)
    }

    /// Offset inside the page of size `S` that contains this address.
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
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:08X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for PhysicalAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl From<PageFrameNumber> for PhysicalAddress {
    #[inline]
    fn from(value: PageFrameNumber) -> Self {
        value.base()
    }
}

impl Add<u32> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u32> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}
