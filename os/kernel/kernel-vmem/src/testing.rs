//! # Simulated i386 machine for host-side tests
//!
//! Physical memory is a boxed slice of 4 KiB-aligned frames; physical
//! addresses are byte offsets into it. Virtual addresses are resolved by a
//! software walk of the directory in "CR3", exactly like the hardware walker
//! (including the recursive entry), so page-table code under test really
//! goes through the recursive window.
//!
//! There is no TLB: every access walks. Invalidations and directory loads
//! are only counted so tests can observe them.

use crate::{DirectoryEntry, DirectoryEntryKind, Mmu, PhysMapper, TableEntry};
use alloc::boxed::Box;
use core::cell::{Cell, UnsafeCell};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, Size4K, Size4M, VirtualAddress};

#[repr(C, align(4096))]
struct Frame(UnsafeCell<[u8; PAGE_SIZE as usize]>);

/// RAM plus the paging registers of a single simulated CPU.
pub struct SimulatedMachine {
    frames: Box<[Frame]>,
    directory: Cell<PhysicalAddress>,
    paging: Cell<bool>,
    has_invlpg: bool,
    invalidations: Cell<usize>,
    directory_loads: Cell<usize>,
}

impl SimulatedMachine {
    /// A machine with `memory_bytes` of zeroed RAM (rounded down to frames).
    #[must_use]
    pub fn new(memory_bytes: u32) -> Self {
        let frames = (0..memory_bytes / PAGE_SIZE)
            .map(|_| Frame(UnsafeCell::new([0; PAGE_SIZE as usize])))
            .collect();
        Self {
            frames,
            directory: Cell::new(PhysicalAddress::zero()),
            paging: Cell::new(false),
            has_invlpg: true,
            invalidations: Cell::new(0),
            directory_loads: Cell::new(0),
        }
    }

    /// Model an i386, which has no `invlpg`.
    #[must_use]
    pub const fn without_invlpg(mut self) -> Self {
        self.has_invlpg = false;
        self
    }

    #[must_use]
    pub fn frame_count(&self) -> u32 {
        u32::try_from(self.frames.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn paging_enabled(&self) -> bool {
        self.paging.get()
    }

    /// Number of `invlpg` executions so far.
    #[must_use]
    pub fn invalidations(&self) -> usize {
        self.invalidations.get()
    }

    /// Number of CR3 writes so far.
    #[must_use]
    pub fn directory_loads(&self) -> usize {
        self.directory_loads.get()
    }

    /// Host pointer to physical byte `pa`.
    ///
    /// # Panics
    /// If `pa` is beyond the installed RAM.
    #[must_use]
    pub fn phys_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let frame = self
            .frames
            .get(pa.frame().as_usize())
            .unwrap_or_else(|| panic!("physical access to {pa} beyond installed RAM"));
        frame.0.get().cast::<u8>().wrapping_add(pa.offset::<Size4K>() as usize)
    }

    #[must_use]
    pub fn read_phys_u32(&self, pa: PhysicalAddress) -> u32 {
        unsafe { self.phys_ptr(pa).cast::<u32>().read_unaligned() }
    }

    pub fn write_phys_u32(&self, pa: PhysicalAddress, value: u32) {
        unsafe { self.phys_ptr(pa).cast::<u32>().write_unaligned(value) }
    }

    /// Hardware walk of `va` through the loaded directory.
    ///
    /// With paging disabled linear addresses are physical.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // both indices are below 1024
    pub fn walk(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        if !self.paging.get() {
            return Some(PhysicalAddress::new(va.as_u32()));
        }

        let pde_pa = self.directory.get() + (va.directory_index() as u32) * 4;
        match DirectoryEntry::from_bits(self.read_phys_u32(pde_pa)).kind()? {
            DirectoryEntryKind::Large4M(base) => Some(base + va.offset::<Size4M>()),
            DirectoryEntryKind::Table(table) => {
                let pte_pa = table.base() + (va.table_index() as u32) * 4;
                TableEntry::from_bits(self.read_phys_u32(pte_pa))
                    .frame()
                    .map(|frame| frame.base() + va.offset::<Size4K>())
            }
        }
    }
}

unsafe impl Mmu for SimulatedMachine {
    fn virt_to_ptr(&self, va: VirtualAddress) -> *mut u8 {
        let pa = self
            .walk(va)
            .unwrap_or_else(|| panic!("page fault: {va} is not mapped"));
        self.phys_ptr(pa)
    }

    fn supports_invlpg(&self) -> bool {
        self.has_invlpg
    }

    fn invlpg(&self, _va: VirtualAddress) {
        assert!(self.has_invlpg, "invalid opcode: invlpg on an i386");
        self.invalidations.set(self.invalidations.get() + 1);
    }

    fn current_directory(&self) -> PhysicalAddress {
        self.directory.get()
    }

    unsafe fn load_directory(&self, directory: PhysicalAddress) {
        assert!(directory.is_aligned::<Size4K>(), "unaligned directory {directory}");
        self.directory.set(directory);
        self.directory_loads.set(self.directory_loads.get() + 1);
    }

    unsafe fn enable_paging(&self) {
        self.paging.set(true);
    }
}

impl PhysMapper for SimulatedMachine {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        debug_assert!(size_of::<T>() <= (PAGE_SIZE - pa.offset::<Size4K>()) as usize);
        // SAFETY: The caller promises `T` matches the bytes in the frame.
        unsafe { &mut *self.phys_ptr(pa).cast::<T>() }
    }
}
