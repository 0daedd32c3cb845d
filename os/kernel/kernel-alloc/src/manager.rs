//! # The memory manager
//!
//! [`MemoryManager`] owns every allocator of the kernel: the buddy system
//! for frames, the virtual region lists, the object caches and the MMU
//! contexts. It is created once by [`MemoryManager::boot`] and then passed
//! around (or installed in a [`GlobalMemory`](crate::GlobalMemory)).
//!
//! ## Record reserves
//!
//! Growing any cache takes a slab record and (usually) a region record.
//! Both come from seed caches that must never run dry while they grow
//! themselves, so every public allocation first tops them up:
//!
//! ```text
//! slab records  == MIN_FREE → new slab for the slab-record cache
//! region records == MIN_FREE → new slab for the region-record cache
//! ```
//!
//! A refill takes its own records straight from the seed caches and, if that
//! left the other seed cache one below the reserve, refills that one too.

use crate::buddy::PhysicalPages;
use crate::error::AllocError;
use crate::list::CircularList;
use crate::memory::KernelMemory;
use crate::slab::{
    CacheId, CacheLayout, CacheNodes, CacheRecord, MIN_FREE, SlabRecord, add_slab, cache_init,
    dump_cache, first_free_slab, give_object, remove_slab, slab_init, take_object,
};
use crate::vregion::{Region, RegionId, VirtualRegions};
use kernel_memory_addresses::{PageFrameNumber, PhysicalAddress, VirtualAddress, VirtualPageNumber};
use kernel_vmem::{Mmu, PageEntryBits, Paging};
use log::{debug, trace, warn};

/// Flags of every kernel slab mapping.
pub(crate) const fn slab_flags() -> PageEntryBits {
    PageEntryBits::new_kernel_rw().with_global_translation(true)
}

/// The seed caches and the registry of all caches.
pub(crate) struct SlabCaches {
    pub(crate) registry: CircularList<VirtualAddress>,
    pub(crate) cache_cache: CacheId,
    pub(crate) slab_cache: CacheId,
    pub(crate) region_cache: CacheId,
}

impl SlabCaches {
    fn is_seed(&self, cache: CacheId) -> bool {
        cache == self.cache_cache || cache == self.slab_cache || cache == self.region_cache
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seed {
    Slabs,
    Regions,
}

/// All memory allocators of the kernel.
pub struct MemoryManager<M> {
    pub(crate) memory: KernelMemory<M>,
    pub(crate) paging: Paging<M>,
    pub(crate) pages: PhysicalPages<M>,
    pub(crate) regions: VirtualRegions<M>,
    pub(crate) caches: SlabCaches,
    pub(crate) contexts: Option<CacheId>,
    pub(crate) active: Option<crate::ContextId>,
    pub(crate) kernel_directory: PageFrameNumber,
}

/// Pop an object from a seed cache that must have one.
fn take_reserved<M: Mmu + Copy>(memory: &KernelMemory<M>, cache: CacheId) -> VirtualAddress {
    take_object(memory, cache).unwrap_or_else(|| {
        panic!(
            "seed cache {:?} ran out of objects",
            memory.read::<CacheRecord>(cache.address()).name()
        )
    })
}

/// Return `object` to `cache`, finding its slab through the frame it is
/// mapped to.
fn release_object<M: Mmu + Copy>(
    memory: &KernelMemory<M>,
    paging: &Paging<M>,
    pages: &PhysicalPages<M>,
    cache: CacheId,
    object: VirtualAddress,
) {
    assert!(!object.is_null(), "freeing a null object");
    let Some(pa) = paging.translate(object) else {
        panic!("freeing {object}, which is not mapped");
    };
    let Some(slab) = pages.slab_of(pa.frame()) else {
        panic!("freeing {object}, which does not lie in a slab");
    };

    let s: SlabRecord = memory.read(slab);
    let base = memory.read::<Region>(s.region()).base();
    give_object(memory, cache, slab, base, object);
}

impl<M: Mmu + Copy> MemoryManager<M> {
    #[must_use]
    pub const fn memory(&self) -> &KernelMemory<M> {
        &self.memory
    }

    #[must_use]
    pub const fn paging(&self) -> &Paging<M> {
        &self.paging
    }

    #[must_use]
    pub const fn pages(&self) -> &PhysicalPages<M> {
        &self.pages
    }

    /// Direct access to the buddy allocator.
    pub const fn pages_mut(&mut self) -> &mut PhysicalPages<M> {
        &mut self.pages
    }

    #[must_use]
    pub const fn regions(&self) -> &VirtualRegions<M> {
        &self.regions
    }

    /// The cache of cache records.
    #[must_use]
    pub const fn cache_cache(&self) -> CacheId {
        self.caches.cache_cache
    }

    /// The cache of slab records.
    #[must_use]
    pub const fn slab_cache(&self) -> CacheId {
        self.caches.slab_cache
    }

    /// The cache of region records.
    #[must_use]
    pub const fn region_cache(&self) -> CacheId {
        self.caches.region_cache
    }

    /// Physical frame of the boot directory.
    #[must_use]
    pub const fn kernel_directory(&self) -> PageFrameNumber {
        self.kernel_directory
    }

    /// Snapshot of the record of `cache`.
    #[must_use]
    pub fn cache_info(&self, cache: CacheId) -> CacheRecord {
        self.memory.read(cache.address())
    }

    fn free_objects(&self, cache: CacheId) -> u32 {
        self.cache_info(cache).free_objects()
    }

    /// All registered caches, oldest first.
    pub fn caches(&self) -> impl Iterator<Item = CacheId> + '_ {
        self.caches
            .registry
            .iter(CacheNodes(self.memory))
            .map(CacheId::from_address)
    }

    /// The first cache registered under `name`.
    #[must_use]
    pub fn find_cache(&self, name: &str) -> Option<CacheId> {
        self.caches().find(|&cache| self.cache_info(cache).name() == name)
    }

    /// Create a cache for objects of `object_size` bytes, carved from slabs
    /// of `pages_per_slab` pages.
    ///
    /// # Errors
    /// [`AllocError::ObjectTooLarge`] if no object fits a slab; exhaustion
    /// errors of [`objs_cache_alloc`](Self::objs_cache_alloc) for the record.
    ///
    /// # Panics
    /// If `name` is longer than 20 bytes or a slab would exceed the largest
    /// physical block.
    pub fn objs_cache_create(
        &mut self,
        name: &str,
        object_size: u32,
        pages_per_slab: u32,
    ) -> Result<CacheId, AllocError> {
        let layout = CacheLayout::new(object_size, pages_per_slab)?;
        assert!(
            pages_per_slab <= self.pages.largest_block(),
            "slabs of {pages_per_slab} pages exceed the largest physical block"
        );

        let cache = CacheId::from_address(self.objs_cache_alloc(self.caches.cache_cache)?);
        cache_init(&self.memory, cache, name, layout);
        self.caches
            .registry
            .push_tail(&CacheNodes(self.memory), cache.address());

        debug!(
            "cache {name:?} created: {} objects of {} bytes per slab",
            layout.objects_per_slab, layout.actual_object_size
        );
        Ok(cache)
    }

    /// Allocate one object from `cache`, growing it by a slab if needed.
    ///
    /// # Errors
    /// [`AllocError::OutOfVirtualSpace`], [`AllocError::OutOfFrames`] or
    /// [`AllocError::OutOfPageTables`] if a new slab was needed and could not
    /// be built. Nothing is leaked in that case.
    pub fn objs_cache_alloc(&mut self, cache: CacheId) -> Result<VirtualAddress, AllocError> {
        self.ensure_reserves();

        if self.free_objects(cache) == 0 {
            self.create_slab(cache)?;
        }

        let Some(object) = take_object(&self.memory, cache) else {
            panic!(
                "cache {:?} has no object after growing",
                self.cache_info(cache).name()
            );
        };
        trace!("allocated {object} from {cache}");
        Ok(object)
    }

    /// Give `object` back to `cache`.
    ///
    /// # Panics
    /// If `object` was not allocated from `cache`.
    pub fn objs_cache_free(&mut self, cache: CacheId, object: VirtualAddress) {
        release_object(&self.memory, &self.paging, &self.pages, cache, object);
        trace!("freed {object} into {cache}");
    }

    /// Release every slab of `cache` without used objects; returns how many.
    ///
    /// # Panics
    /// For the seed caches.
    pub fn objs_cache_shrink(&mut self, cache: CacheId) -> u32 {
        assert!(!self.caches.is_seed(cache), "seed caches are never shrunk");

        let mut released = 0;
        while let Some(slab) = first_free_slab(&self.memory, cache) {
            remove_slab(&self.memory, cache, slab);

            let region = RegionId::from_address(self.memory.read::<SlabRecord>(slab).region());
            let r = self.regions.record(region);
            let Some(head) = self.paging.translate(r.base()).map(PhysicalAddress::frame) else {
                panic!("slab {slab} of {cache} is not mapped");
            };
            for page in (0..r.pages()).map(|i| r.first_page() + i) {
                let Some(frame) = self.paging.unmap(page) else {
                    panic!("slab page {page} is not mapped");
                };
                self.pages.set_slab(frame, None);
                self.pages.set_mapping(frame, None);
            }
            let order = self.pages.order_of(head);
            self.pages.free_block(head, order);

            self.release_region(region);
            self.objs_cache_free(self.caches.slab_cache, slab);
            released += 1;
        }

        if released > 0 {
            debug!("released {released} slab(s) of {cache}");
        }
        released
    }

    /// Shrink and unregister `cache` and free its record.
    ///
    /// # Panics
    /// For the seed caches, the MMU context cache, or if objects are still
    /// in use.
    pub fn objs_cache_destroy(&mut self, cache: CacheId) {
        assert!(!self.caches.is_seed(cache), "seed caches are never destroyed");
        assert_ne!(self.contexts, Some(cache), "the MMU context cache is never destroyed");
        let info = self.cache_info(cache);
        assert_eq!(
            info.used_objects(),
            0,
            "destroying cache {:?} with objects in use",
            info.name()
        );

        self.objs_cache_shrink(cache);
        self.caches
            .registry
            .remove(&CacheNodes(self.memory), cache.address());
        self.objs_cache_free(self.caches.cache_cache, cache.address());
        debug!("cache {:?} destroyed", info.name());
    }

    /// Top up the slab- and region-record caches.
    fn ensure_reserves(&mut self) {
        let slabs = self.free_objects(self.caches.slab_cache);
        assert!(slabs >= MIN_FREE, "slab record reserve exhausted ({slabs} left)");
        if slabs == MIN_FREE {
            self.refill(Seed::Slabs);
        }

        let regions = self.free_objects(self.caches.region_cache);
        assert!(regions >= MIN_FREE, "region record reserve exhausted ({regions} left)");
        if regions == MIN_FREE {
            self.refill(Seed::Regions);
        }
    }

    /// Add a slab to a seed cache.
    ///
    /// # Panics
    /// If memory is exhausted.
    fn refill(&mut self, seed: Seed) {
        let (cache, other, other_seed) = match seed {
            Seed::Slabs => (self.caches.slab_cache, self.caches.region_cache, Seed::Regions),
            Seed::Regions => (self.caches.region_cache, self.caches.slab_cache, Seed::Slabs),
        };

        if let Err(e) = self.create_slab(cache) {
            panic!("cannot refill cache {:?}: {e}", self.cache_info(cache).name());
        }
        trace!("refilled {seed:?} reserve");

        if self.free_objects(other) == MIN_FREE - 1 {
            self.refill(other_seed);
        }
    }

    /// Build a slab for `cache` and file it as free.
    ///
    /// Records come straight from the seed caches. On failure everything
    /// taken so far is returned.
    fn create_slab(&mut self, cache: CacheId) -> Result<(), AllocError> {
        let count = self.cache_info(cache).pages_per_slab();
        let slab = take_reserved(&self.memory, self.caches.slab_cache);

        let Some(region) = self.alloc_region_raw(count) else {
            self.objs_cache_free(self.caches.slab_cache, slab);
            return Err(AllocError::OutOfVirtualSpace);
        };

        let frames = match self.pages.alloc_n(count) {
            Ok(frames) => frames,
            Err(e) => {
                self.release_region(region);
                self.objs_cache_free(self.caches.slab_cache, slab);
                return Err(e);
            }
        };

        let page = self.regions.record(region).first_page();
        if let Err(e) = self
            .paging
            .map_range(&mut self.pages, frames, page, count, slab_flags())
        {
            // Mapping stops at the first failure; nothing past it is mapped.
            for i in 0..count {
                let Some(frame) = self.paging.unmap(page + i) else {
                    break;
                };
                assert_eq!(frame, frames + i, "slab page {} mapped a foreign frame", page + i);
            }
            warn!("slab for {cache} rolled back: {e}");
            let order = self.pages.order_of(frames);
            self.pages.free_block(frames, order);
            self.release_region(region);
            self.objs_cache_free(self.caches.slab_cache, slab);
            return Err(e.into());
        }

        self.attach_slab(cache, slab, region, frames);
        trace!("new slab {slab} for {cache} at {page}");
        Ok(())
    }

    /// Initialise `slab` over the mapped `region`, link its frames and file it.
    fn attach_slab(
        &mut self,
        cache: CacheId,
        slab: VirtualAddress,
        region: RegionId,
        frames: PageFrameNumber,
    ) {
        let r = self.regions.record(region);
        slab_init(&self.memory, slab, cache, region.address(), r.base(), 0);
        for i in 0..r.pages() {
            self.pages.set_slab(frames + i, Some(slab));
            self.pages.set_mapping(frames + i, Some(r.first_page() + i));
        }
        add_slab(&self.memory, cache, slab);
    }

    /// First-fit region allocation with the remainder record taken directly
    /// from the region-record cache.
    fn alloc_region_raw(&mut self, pages: u32) -> Option<RegionId> {
        let (memory, region_cache) = (self.memory, self.caches.region_cache);
        self.regions
            .alloc(pages, || RegionId::from_address(take_reserved(&memory, region_cache)))
    }

    /// Free `region`; records absorbed by merging go back to their cache.
    fn release_region(&mut self, region: RegionId) {
        let (memory, paging, region_cache) = (self.memory, self.paging, self.caches.region_cache);
        let pages = &self.pages;
        self.regions.free(region, |absorbed| {
            release_object(&memory, &paging, pages, region_cache, absorbed.address());
        });
    }

    /// Reserve `pages` pages of kernel virtual space (not mapped).
    ///
    /// # Errors
    /// [`AllocError::OutOfVirtualSpace`] if no free region is large enough.
    pub fn region_alloc(&mut self, pages: u32) -> Result<RegionId, AllocError> {
        self.ensure_reserves();
        self.alloc_region_raw(pages)
            .ok_or(AllocError::OutOfVirtualSpace)
    }

    /// Return a region from [`region_alloc`](Self::region_alloc).
    ///
    /// Its pages must have been unmapped by the caller.
    pub fn region_free(&mut self, region: RegionId) {
        self.release_region(region);
    }

    /// Map `page` to `frame` in the active address space; page tables come
    /// from the buddy allocator.
    ///
    /// # Errors
    /// [`AllocError::OutOfPageTables`] if a page table was needed and no frame
    /// was left.
    pub fn map(
        &mut self,
        frame: PageFrameNumber,
        page: VirtualPageNumber,
        flags: PageEntryBits,
    ) -> Result<(), AllocError> {
        Ok(self.paging.map(&mut self.pages, frame, page, flags)?)
    }

    /// Map `count` consecutive pages to consecutive frames.
    ///
    /// # Errors
    /// As [`map`](Self::map); earlier pages stay mapped.
    pub fn map_range(
        &mut self,
        frame: PageFrameNumber,
        page: VirtualPageNumber,
        count: u32,
        flags: PageEntryBits,
    ) -> Result<(), AllocError> {
        Ok(self.paging.map_range(&mut self.pages, frame, page, count, flags)?)
    }

    /// Remove the mapping of `page`, returning its frame.
    pub fn unmap(&mut self, page: VirtualPageNumber) -> Option<PageFrameNumber> {
        self.paging.unmap(page)
    }

    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.paging.translate(va)
    }

    /// Log the state of every allocator.
    pub fn dump(&self) {
        self.pages.dump();
        self.regions.dump();
        for cache in self.caches() {
            dump_cache(&self.memory, cache);
        }
    }
}
