#![allow(dead_code)]

use core::sync::atomic::{AtomicUsize, Ordering};
use kernel_alloc::{CacheId, MemoryManager};
use kernel_info::boot::BootInfo;
use kernel_memory_addresses::PhysicalAddress;
use kernel_qemu::{ByteSink, QemuLogger};
use kernel_vmem::testing::SimulatedMachine;
use log::LevelFilter;

pub const MEMORY_BYTES: u32 = 4 * 1024 * 1024;

pub type Manager<'a> = MemoryManager<&'a SimulatedMachine>;

/// 4 MiB of RAM with a 64 KiB kernel image at 1 MiB.
pub fn boot_info() -> BootInfo {
    BootInfo::new(
        MEMORY_BYTES,
        PhysicalAddress::new(0x0010_0000),
        PhysicalAddress::new(0x0011_0000),
    )
}

pub fn machine() -> SimulatedMachine {
    SimulatedMachine::new(MEMORY_BYTES)
}

/// Counts the bytes of formatted log lines.
pub struct CountingSink(AtomicUsize);

impl ByteSink for CountingSink {
    fn put(&self, _byte: u8) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

static LOGGER: QemuLogger<CountingSink> =
    QemuLogger::with_sink(CountingSink(AtomicUsize::new(0)), LevelFilter::Trace);

pub fn logged_bytes() -> usize {
    LOGGER.sink().0.load(Ordering::Relaxed)
}

pub fn boot(machine: &SimulatedMachine) -> Manager<'_> {
    boot_with(machine, &boot_info())
}

pub fn boot_with<'a>(machine: &'a SimulatedMachine, info: &BootInfo) -> Manager<'a> {
    // Fails once another test of this binary got there first.
    let _ = LOGGER.init();
    // SAFETY: the machine is fresh and its frames are ours.
    unsafe { MemoryManager::boot(machine, machine, info) }
}

/// Object counts of `cache` agree with its slabs.
pub fn assert_accounting(mm: &Manager<'_>, cache: CacheId) {
    let c = mm.cache_info(cache);
    assert_eq!(
        c.slabs(),
        c.free_slabs() + c.partial_slabs() + c.full_slabs(),
        "slab counts of {:?}",
        c.name()
    );
    assert_eq!(
        c.free_objects() + c.used_objects(),
        c.slabs() * c.objects_per_slab(),
        "object counts of {:?}",
        c.name()
    );
}
