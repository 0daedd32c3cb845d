//! # Typed access to kernel virtual memory
//!
//! All allocator bookkeeping (page descriptors, region, slab and cache
//! records, free-object links) lives in mapped kernel memory, not in Rust
//! objects. [`KernelMemory`] is the one place where such an address turns
//! into a read or a write; everything above it works with plain values and
//! [`VirtualAddress`] handles.

use core::mem::MaybeUninit;
use core::ptr::copy_nonoverlapping;
use kernel_memory_addresses::{PAGE_SIZE, Size4K, VirtualAddress, VirtualPageNumber};
use kernel_vmem::Mmu;

/// Plain-old-data record stored in kernel memory.
///
/// # Safety
/// Implementors must be `#[repr(C)]` and valid for every bit pattern: records
/// are read back from memory that may have been written by anyone.
pub unsafe trait Record: Copy {}

unsafe impl Record for u32 {}

/// Reads and writes records at kernel virtual addresses.
#[derive(Debug, Clone, Copy)]
pub struct KernelMemory<M> {
    mmu: M,
}

impl<M: Mmu> KernelMemory<M> {
    #[must_use]
    pub const fn new(mmu: M) -> Self {
        Self { mmu }
    }

    #[must_use]
    pub const fn mmu(&self) -> &M {
        &self.mmu
    }

    /// Read the record at `va`.
    ///
    /// # Panics
    /// On a null address, or (through the [`Mmu`]) if `va` is not mapped.
    #[must_use]
    pub fn read<T: Record>(&self, va: VirtualAddress) -> T {
        assert!(!va.is_null(), "read through a null reference");
        let mut record = MaybeUninit::<T>::uninit();
        let dst = record.as_mut_ptr().cast::<u8>();
        for (at, done, len) in pieces(va, size_of::<T>()) {
            // SAFETY: `Mmu` resolves the rest of the page holding `at`;
            // `dst` has room for the whole record.
            unsafe { copy_nonoverlapping(self.mmu.virt_to_ptr(at), dst.add(done), len) }
        }
        // SAFETY: every byte was written above and `T` accepts any bits.
        unsafe { record.assume_init() }
    }

    /// Write `value` at `va`.
    ///
    /// # Panics
    /// As [`read`](Self::read).
    pub fn write<T: Record>(&self, va: VirtualAddress, value: T) {
        assert!(!va.is_null(), "write through a null reference");
        let src = (&raw const value).cast::<u8>();
        for (at, done, len) in pieces(va, size_of::<T>()) {
            // SAFETY: see `read`.
            unsafe { copy_nonoverlapping(src.add(done), self.mmu.virt_to_ptr(at), len) }
        }
    }

    /// Read-modify-write of the record at `va`.
    pub fn update<T: Record, R>(&self, va: VirtualAddress, f: impl FnOnce(&mut T) -> R) -> R {
        let mut record = self.read::<T>(va);
        let result = f(&mut record);
        self.write(va, record);
        result
    }

    /// The address stored in the first word at `va`; `None` for null.
    ///
    /// Free slab objects keep their successor here.
    #[must_use]
    pub fn read_link(&self, va: VirtualAddress) -> Option<VirtualAddress> {
        let next = VirtualAddress::new(self.read::<u32>(va));
        (!next.is_null()).then_some(next)
    }

    pub fn write_link(&self, va: VirtualAddress, next: Option<VirtualAddress>) {
        self.write(va, next.map_or(0, VirtualAddress::as_u32));
    }

    /// Fill the mapped page `page` with zeroes.
    pub fn zero_page(&self, page: VirtualPageNumber) {
        let base = page.base();
        assert!(!base.is_null(), "zeroing the null page");
        // SAFETY: the page is mapped; `virt_to_ptr` resolves its first byte
        // and a page never straddles two frames.
        unsafe { self.mmu.virt_to_ptr(base).write_bytes(0, PAGE_SIZE as usize) }
    }
}

/// Split the `len` bytes at `va` at page boundaries: `(address, offset, length)`.
///
/// Records in the descriptor table straddle pages, and consecutive pages need
/// not sit in consecutive frames.
#[allow(clippy::cast_possible_truncation)] // records are a few dozen bytes
fn pieces(va: VirtualAddress, len: usize) -> impl Iterator<Item = (VirtualAddress, usize, usize)> {
    let mut done = 0;
    core::iter::from_fn(move || {
        (done < len).then(|| {
            let at = va + done as u32;
            let room = (PAGE_SIZE - at.offset::<Size4K>()) as usize;
            let piece = room.min(len - done);
            let item = (at, done, piece);
            done += piece;
            item
        })
    })
}

/// Encode an optional address as a record field (`0` for none).
#[inline]
#[must_use]
pub const fn encode_address(va: Option<VirtualAddress>) -> u32 {
    match va {
        Some(va) => va.as_u32(),
        None => 0,
    }
}

/// Decode a record field written by [`encode_address`].
#[inline]
#[must_use]
pub const fn decode_address(raw: u32) -> Option<VirtualAddress> {
    if raw == 0 {
        None
    } else {
        Some(VirtualAddress::new(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_vmem::testing::SimulatedMachine;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Pair {
        a: u32,
        b: u32,
    }

    unsafe impl Record for Pair {}

    #[test]
    fn records_round_trip_through_memory() {
        let machine = SimulatedMachine::new(64 * 1024);
        let memory = KernelMemory::new(&machine);
        let va = VirtualAddress::new(0x2004);

        memory.write(va, Pair { a: 1, b: 2 });
        assert_eq!(memory.read::<Pair>(va), Pair { a: 1, b: 2 });

        let old = memory.update(va, |p: &mut Pair| core::mem::replace(&mut p.b, 7));
        assert_eq!(old, 2);
        assert_eq!(memory.read::<Pair>(va).b, 7);
        // Paging is off, so the bytes sit at the same physical address.
        assert_eq!(machine.read_phys_u32(kernel_memory_addresses::PhysicalAddress::new(0x2008)), 7);
    }

    #[test]
    fn pieces_split_at_page_boundaries() {
        let split: Vec<_> = pieces(VirtualAddress::new(0x4FF8), 24).collect();
        assert_eq!(
            split,
            [(VirtualAddress::new(0x4FF8), 0, 8), (VirtualAddress::new(0x5000), 8, 16)]
        );
        assert_eq!(pieces(VirtualAddress::new(0x4000), 24).count(), 1);
    }

    #[test]
    fn links_treat_zero_as_end() {
        let machine = SimulatedMachine::new(64 * 1024);
        let memory = KernelMemory::new(&machine);
        let va = VirtualAddress::new(0x3000);

        assert_eq!(memory.read_link(va), None);
        memory.write_link(va, Some(VirtualAddress::new(0x3010)));
        assert_eq!(memory.read_link(va), Some(VirtualAddress::new(0x3010)));
        memory.write_link(va, None);
        assert_eq!(memory.read_link(va), None);
    }

    #[test]
    fn zero_page_clears_whole_page() {
        let machine = SimulatedMachine::new(64 * 1024);
        let memory = KernelMemory::new(&machine);
        memory.write(VirtualAddress::new(0x4000), u32::MAX);
        memory.write(VirtualAddress::new(0x4FFC), u32::MAX);
        memory.write(VirtualAddress::new(0x5000), u32::MAX);

        memory.zero_page(VirtualPageNumber::new(4));
        assert_eq!(memory.read::<u32>(VirtualAddress::new(0x4000)), 0);
        assert_eq!(memory.read::<u32>(VirtualAddress::new(0x4FFC)), 0);
        assert_eq!(memory.read::<u32>(VirtualAddress::new(0x5000)), u32::MAX);
    }

    #[test]
    #[should_panic(expected = "null")]
    fn null_read_panics() {
        let machine = SimulatedMachine::new(64 * 1024);
        let _ = KernelMemory::new(&machine).read::<u32>(VirtualAddress::zero());
    }
}
