use crate::{PhysicalAddress, Size4K, PageSize};
use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// Physical page frame number (PPN): a physical address shifted right by 12.
///
/// Frame numbers index the page-descriptor table and are what page-table
/// entries store in their upper 20 bits.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let ppn = PageFrameNumber::new(0x100);
/// assert_eq!(ppn.base(), PhysicalAddress::new(0x0010_0000));
/// assert!(ppn.is_aligned_to_order(8));
/// assert!(!ppn.is_aligned_to_order(9));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageFrameNumber(u32);

impl PageFrameNumber {
    #[inline]
    #[must_use]
    pub const fn new(ppn: u32) -> Self {
        Self(ppn)
    }

    /// The frame containing `pa`.
    #[inline]
    #[must_use]
    pub const fn containing(pa: PhysicalAddress) -> Self {
        pa.frame()
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

    /// Physical address of the first byte of the frame.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 << Size4K::SHIFT)
    }

    /// Whether the frame number is a multiple of `2^order`.
    #[inline]
    #[must_use]
    pub const fn is_aligned_to_order(self, order: u32) -> bool {
        self.0 & ((1 << order) - 1) == 0
    }
}

impl fmt::Debug for PageFrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PPN({:#x})", self.0)
    }
}

impl fmt::Display for PageFrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Add<u32> for PageFrameNumber {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u32> for PageFrameNumber {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}

/// Distance in frames.
impl Sub for PageFrameNumber {
    type Output = u32;
    #[inline]
    fn sub(self, rhs: Self) -> u32 {
        self.0 - rhs.0
    }
}
