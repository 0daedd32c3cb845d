//! # Bootstrap
//!
//! The allocators depend on each other in a circle: caches grow by taking
//! virtual regions, region records are cache objects, and cache and slab
//! records are cache objects too. [`MemoryManager::boot`] breaks the circle
//! by building the first slab of each seed cache by hand:
//!
//! ```text
//! frames:  [0, 1M) used | [1M, kernel) free | kernel | boot frames | free ...
//!                                                      ^ directory, kernel table,
//!                                                        descriptor table
//! pages:   kernel image | descriptor table | cache slab | slab slab | region slab | free region
//! ```
//!
//! Each seed slab holds the three records describing the seed slabs
//! themselves, so its first three objects start out in use.

use crate::buddy::{FrameStatus, MAX_BLOCK_ORDER, PhysicalPages};
use crate::frame_alloc::{BootFrameAlloc, BootPageAlloc};
use crate::manager::{MemoryManager, SlabCaches, slab_flags};
use crate::list::CircularList;
use crate::memory::KernelMemory;
use crate::slab::{
    CACHE_RECORD_SIZE, CacheId, CacheLayout, CacheNodes, CacheRecord, MIN_FREE, SLAB_RECORD_SIZE,
    add_slab, cache_init, slab_init,
};
use crate::vregion::{REGION_RECORD_SIZE, Region, RegionId, VirtualRegions};
use kernel_info::boot::BootInfo;
use kernel_info::memory::LOW_MEMORY_END;
use kernel_memory_addresses::{PageFrameNumber, PhysicalAddress, VirtualPageNumber, pages_for};
use kernel_vmem::{BootTables, Mmu, Paging, PhysMapper, paging_boot_init};
use log::info;

/// Names and record sizes of the seed caches, in slab order.
const SEEDS: [(&str, u32); 3] = [
    ("Objs_cache", CACHE_RECORD_SIZE),
    ("Slab", SLAB_RECORD_SIZE),
    ("Vregion", REGION_RECORD_SIZE),
];

/// Objects pre-used in each seed slab: one record per seed.
const SEED_COUNT: u32 = 3;

fn boot_frame(frames: &mut BootFrameAlloc) -> PageFrameNumber {
    frames
        .alloc()
        .unwrap_or_else(|| panic!("out of physical memory during boot"))
}

fn boot_page(pages: &mut BootPageAlloc) -> VirtualPageNumber {
    pages
        .alloc()
        .unwrap_or_else(|| panic!("out of kernel virtual space during boot"))
}

impl<M: Mmu + Copy> MemoryManager<M> {
    /// Turn on paging and set up every allocator.
    ///
    /// # Safety
    /// As [`paging_boot_init`]: `phys` must reach the frames right behind the
    /// kernel image, and the kernel must run at its higher-half link address.
    /// Must be called once, before anything else touches paging.
    ///
    /// # Panics
    /// If memory runs out before the allocators are up, or `info` describes a
    /// kernel below 1 MiB.
    pub unsafe fn boot<P: PhysMapper + ?Sized>(mmu: M, phys: &P, info: &BootInfo) -> Self {
        let mut frames = BootFrameAlloc::new(info.first_free_frame(), info.last_frame);
        let mut pages = BootPageAlloc::new(info.first_free_page(), info.heap_last_page);

        let tables = BootTables {
            directory: boot_frame(&mut frames),
            kernel_table: boot_frame(&mut frames),
        };
        // SAFETY: forwarded to the caller.
        unsafe { paging_boot_init(phys, &mmu, tables, info) };

        let memory = KernelMemory::new(mmu);
        let paging = Paging::new(mmu);
        let mut buddy = descriptor_table(memory, paging, &mut frames, &mut pages, info);

        let low_end = PhysicalAddress::new(LOW_MEMORY_END).frame();
        let kernel_first = info.kernel_first_frame();
        assert!(kernel_first >= low_end, "kernel image below 1 MiB");
        buddy.add_run(PageFrameNumber::new(0), low_end, FrameStatus::Used);
        buddy.add_run(low_end, kernel_first, FrameStatus::Free);
        buddy.add_run(kernel_first, frames.first(), FrameStatus::Used);
        buddy.add_run(frames.first(), frames.next_free(), FrameStatus::Used);
        buddy.add_run(frames.next_free(), info.last_frame + 1, FrameStatus::Free);
        info!(
            "physical pages: {} frames, {} consumed during boot",
            buddy.managed_frames(),
            frames.consumed()
        );

        let (caches, seed_regions) = seed_caches(memory, paging, &mut buddy, &mut pages);

        let mut manager = Self {
            memory,
            paging,
            pages: buddy,
            regions: VirtualRegions::new(memory),
            caches,
            contexts: None,
            active: None,
            kernel_directory: tables.directory,
        };

        let region_cache = manager.caches.region_cache;
        let free = manager
            .objs_cache_alloc(region_cache)
            .unwrap_or_else(|e| panic!("no record for the free virtual region: {e}"));
        manager.regions.boot(
            Some(seed_regions),
            RegionId::from_address(free),
            pages.next_free(),
            pages.last(),
        );

        info!(
            "memory manager up: {} free frames, {} free kernel pages",
            manager.pages.stats().free_frames,
            manager.regions.free_pages()
        );
        manager
    }
}

/// Bump-allocate and map the page descriptor table covering all frames.
fn descriptor_table<M: Mmu + Copy>(
    memory: KernelMemory<M>,
    paging: Paging<M>,
    frames: &mut BootFrameAlloc,
    pages: &mut BootPageAlloc,
    info: &BootInfo,
) -> PhysicalPages<M> {
    let managed = info.last_frame.as_u32() + 1;
    let count = pages_for(PhysicalPages::<M>::table_size(managed));

    let first = pages.next_free();
    for _ in 0..count {
        let frame = boot_frame(frames);
        let page = boot_page(pages);
        if let Err(e) = paging.map(frames, frame, page, slab_flags()) {
            panic!("mapping the page descriptor table: {e}");
        }
    }

    PhysicalPages::new(memory, first.base(), PageFrameNumber::new(0), managed, MAX_BLOCK_ORDER)
}

/// Build the seed slabs and caches; returns them with the chain of the
/// three seed region records.
fn seed_caches<M: Mmu + Copy>(
    memory: KernelMemory<M>,
    paging: Paging<M>,
    buddy: &mut PhysicalPages<M>,
    pages: &mut BootPageAlloc,
) -> (SlabCaches, RegionId) {
    let seed_pages: [VirtualPageNumber; 3] = core::array::from_fn(|_| boot_page(pages));
    let seed_frames: [PageFrameNumber; 3] = core::array::from_fn(|_| {
        buddy
            .alloc_frame()
            .unwrap_or_else(|e| panic!("no frame for a seed slab: {e}"))
    });
    for (&frame, &page) in seed_frames.iter().zip(&seed_pages) {
        if let Err(e) = paging.map(buddy, frame, page, slab_flags()) {
            panic!("mapping seed slab {page}: {e}");
        }
    }

    // Slab 0 holds the cache records, slab 1 the slab records, slab 2 the
    // region records; record `i` of each describes seed `i`.
    let cache_at = |i: u32| CacheId::from_address(seed_pages[0].base() + i * CACHE_RECORD_SIZE);
    let slab_at = |i: u32| seed_pages[1].base() + i * SLAB_RECORD_SIZE;
    let region_at = |i: u32| RegionId::from_address(seed_pages[2].base() + i * REGION_RECORD_SIZE);

    let mut registry = CircularList::new();
    let seeds = SEEDS.iter().zip(seed_pages.iter().zip(&seed_frames));
    for (i, (&(name, size), (&page, &frame))) in (0u32..).zip(seeds) {
        let next = (i + 1 < SEED_COUNT).then(|| region_at(i + 1));
        memory.write(region_at(i).address(), Region::new(page, 1).with_next(next));

        let layout =
            CacheLayout::new(size, 1).unwrap_or_else(|e| panic!("seed cache {name:?}: {e}"));
        cache_init(&memory, cache_at(i), name, layout);
        slab_init(
            &memory,
            slab_at(i),
            cache_at(i),
            region_at(i).address(),
            page.base(),
            SEED_COUNT,
        );
        buddy.set_slab(frame, Some(slab_at(i)));
        buddy.set_mapping(frame, Some(page));

        registry.push_tail(&CacheNodes(memory), cache_at(i).address());
        add_slab(&memory, cache_at(i), slab_at(i));
    }

    let caches = SlabCaches {
        registry,
        cache_cache: cache_at(0),
        slab_cache: cache_at(1),
        region_cache: cache_at(2),
    };
    let spare = memory
        .read::<CacheRecord>(caches.slab_cache.address())
        .free_objects();
    assert!(spare > MIN_FREE, "seed slab cache starts at its reserve");

    (caches, region_at(0))
}
