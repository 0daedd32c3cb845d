use crate::{PageSize, Size4K, VirtualAddress};
use core::fmt;
use core::ops::{Add, AddAssign, Sub};

/// Virtual page number (VPN): a virtual address shifted right by 12.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let vpn = VirtualAddress::new(0xC000_1234).page();
/// assert_eq!(vpn.as_u32(), 0xC0001);
/// assert_eq!(vpn.base(), VirtualAddress::new(0xC000_1000));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPageNumber(u32);

impl VirtualPageNumber {
    #[inline]
    #[must_use]
    pub const fn new(vpn: u32) -> Self {
        Self(vpn)
    }

    #[inline]
    #[must_use]
    pub const fn containing(va: VirtualAddress) -> Self {
        va.page()
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.0 << Size4K::SHIFT)
    }
}

impl fmt::Debug for VirtualPageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VPN({:#x})", self.0)
    }
}

impl fmt::Display for VirtualPageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Add<u32> for VirtualPageNumber {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u32> for VirtualPageNumber {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}

/// Distance in pages.
impl Sub for VirtualPageNumber {
    type Output = u32;
    #[inline]
    fn sub(self, rhs: Self) -> u32 {
        self.0 - rhs.0
    }
}
