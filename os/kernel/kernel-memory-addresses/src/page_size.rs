use core::fmt;
use core::hash::Hash;

/// Sealed trait pattern to restrict `PageSize` impls to our markers.
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for the page sizes of 32-bit two-level paging.
pub trait PageSize:
    sealed::Sealed
    + Clone
    + Copy
    + Eq
    + PartialEq
    + Ord
    + PartialOrd
    + Hash
    + fmt::Display
    + fmt::Debug
{
    /// Page size in bytes (power of two).
    const SIZE: u32;
    /// log2(SIZE), i.e., number of low bits used for the offset.
    const SHIFT: u32;

    fn as_str() -> &'static str;
}

/// 4 KiB page (4096 bytes), mapped by a page-table entry.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size4K;
impl sealed::Sealed for Size4K {}
impl PageSize for Size4K {
    const SIZE: u32 = 4096;
    const SHIFT: u32 = 12;

    fn as_str() -> &'static str {
        "4K"
    }
}

/// 4 MiB page (`4_194_304` bytes), mapped directly by a directory entry with `PS=1`.
///
/// This is also the span covered by a single page table.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size4M;
impl sealed::Sealed for Size4M {}
impl PageSize for Size4M {
    const SIZE: u32 = 4 * 1024 * 1024;
    const SHIFT: u32 = 22;

    fn as_str() -> &'static str {
        "4M"
    }
}

impl fmt::Display for Size4K {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(Self::as_str())
    }
}

impl fmt::Display for Size4M {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(Self::as_str())
    }
}

impl fmt::Debug for Size4K {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self, f)
    }
}

impl fmt::Debug for Size4M {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self, f)
    }
}

/// Size of a base page in bytes.
pub const PAGE_SIZE: u32 = Size4K::SIZE;

/// Number of offset bits in a base page.
pub const PAGE_SHIFT: u32 = Size4K::SHIFT;

/// Align `x` down to the nearest multiple of `a` (`a` must be a power of two).
#[inline]
#[must_use]
pub const fn align_down(x: u32, a: u32) -> u32 {
    x & !(a - 1)
}

/// Align `x` up to the nearest multiple of `a` (`a` must be a power of two).
///
/// `x + (a - 1)` must not overflow.
#[inline]
#[must_use]
pub const fn align_up(x: u32, a: u32) -> u32 {
    (x + a - 1) & !(a - 1)
}

/// Number of 4 KiB pages needed to hold `bytes` bytes.
#[inline]
#[must_use]
pub const fn pages_for(bytes: u32) -> u32 {
    bytes.div_ceil(PAGE_SIZE)
}
