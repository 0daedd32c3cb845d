//! # Slab records and object caches
//!
//! An object cache hands out fixed-size objects carved from slabs. A slab is
//! a run of mapped kernel pages (a virtual region backed by one buddy block)
//! plus a [`SlabRecord`] that threads its free objects into a list: the
//! first word of every free object holds the address of the next one.
//!
//! ```text
//! cache ──┬─ free    ⇄ slab ⇄ slab        (no object in use)
//!         ├─ partial ⇄ slab               (some objects in use)
//!         └─ full    ⇄ slab ⇄ slab ⇄ slab (no object left)
//! ```
//!
//! Cache and slab records are themselves objects of the seed caches, so
//! everything here works on records in kernel memory through
//! [`KernelMemory`]. Growing and shrinking caches needs the page and region
//! allocators and lives in the memory manager.

use crate::error::AllocError;
use crate::list::{CircularList, ListNodes};
use crate::memory::{KernelMemory, Record, decode_address, encode_address};
use core::fmt;
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress};
use kernel_vmem::Mmu;
use log::debug;

/// Free objects the slab- and region-record caches keep in reserve.
pub const MIN_FREE: u32 = 2;

/// Longest cache name in bytes.
pub const CACHE_NAME_LEN: usize = 20;

/// Size of a slab record.
pub const SLAB_RECORD_SIZE: u32 = 24;

/// Size of a cache record.
pub const CACHE_RECORD_SIZE: u32 = 92;

/// Smallest object: one free-list link.
const WORD: u32 = 4;

/// Bookkeeping for one slab.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SlabRecord {
    free_count: u32,
    region: u32,
    free_list: u32,
    cache: u32,
    prev: u32,
    next: u32,
}

unsafe impl Record for SlabRecord {}

const _: () = assert!(size_of::<SlabRecord>() == SLAB_RECORD_SIZE as usize);

impl SlabRecord {
    #[must_use]
    pub const fn free_count(&self) -> u32 {
        self.free_count
    }

    /// Record of the region the slab's objects live in.
    #[must_use]
    pub const fn region(&self) -> VirtualAddress {
        VirtualAddress::new(self.region)
    }

    /// Cache owning the slab.
    #[must_use]
    pub const fn cache(&self) -> Option<VirtualAddress> {
        decode_address(self.cache)
    }
}

/// Which of its cache's lists a slab is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlabState {
    Free,
    Partial,
    Full,
}

impl SlabState {
    const fn of(free_count: u32, objects_per_slab: u32) -> Self {
        if free_count == 0 {
            Self::Full
        } else if free_count == objects_per_slab {
            Self::Free
        } else {
            Self::Partial
        }
    }
}

/// An object cache.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CacheRecord {
    name: [u8; CACHE_NAME_LEN + 4],
    object_size: u32,
    actual_object_size: u32,
    pages_per_slab: u32,
    slab_size: u32,
    objects_per_slab: u32,
    wasted: u32,
    free_objects: u32,
    used_objects: u32,
    slabs: u32,
    free_slabs: u32,
    partial_slabs: u32,
    full_slabs: u32,
    free_list: u32,
    partial_list: u32,
    full_list: u32,
    prev: u32,
    next: u32,
}

unsafe impl Record for CacheRecord {}

const _: () = assert!(size_of::<CacheRecord>() == CACHE_RECORD_SIZE as usize);

impl CacheRecord {
    /// The cache name; empty if the stored bytes are not UTF-8.
    #[must_use]
    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(CACHE_NAME_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or_default()
    }

    #[must_use]
    pub const fn object_size(&self) -> u32 {
        self.object_size
    }

    /// Stride between objects in a slab.
    #[must_use]
    pub const fn actual_object_size(&self) -> u32 {
        self.actual_object_size
    }

    #[must_use]
    pub const fn pages_per_slab(&self) -> u32 {
        self.pages_per_slab
    }

    #[must_use]
    pub const fn slab_size(&self) -> u32 {
        self.slab_size
    }

    #[must_use]
    pub const fn objects_per_slab(&self) -> u32 {
        self.objects_per_slab
    }

    /// Bytes at the end of each slab too small for another object.
    #[must_use]
    pub const fn wasted(&self) -> u32 {
        self.wasted
    }

    #[must_use]
    pub const fn free_objects(&self) -> u32 {
        self.free_objects
    }

    #[must_use]
    pub const fn used_objects(&self) -> u32 {
        self.used_objects
    }

    #[must_use]
    pub const fn slabs(&self) -> u32 {
        self.slabs
    }

    #[must_use]
    pub const fn free_slabs(&self) -> u32 {
        self.free_slabs
    }

    #[must_use]
    pub const fn partial_slabs(&self) -> u32 {
        self.partial_slabs
    }

    #[must_use]
    pub const fn full_slabs(&self) -> u32 {
        self.full_slabs
    }

    const fn list_head(&self, state: SlabState) -> u32 {
        match state {
            SlabState::Free => self.free_list,
            SlabState::Partial => self.partial_list,
            SlabState::Full => self.full_list,
        }
    }

    const fn list_head_mut(&mut self, state: SlabState) -> &mut u32 {
        match state {
            SlabState::Free => &mut self.free_list,
            SlabState::Partial => &mut self.partial_list,
            SlabState::Full => &mut self.full_list,
        }
    }

    const fn slab_count_mut(&mut self, state: SlabState) -> &mut u32 {
        match state {
            SlabState::Free => &mut self.free_slabs,
            SlabState::Partial => &mut self.partial_slabs,
            SlabState::Full => &mut self.full_slabs,
        }
    }
}

/// Handle of an object cache: the address of its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheId(VirtualAddress);

impl CacheId {
    #[must_use]
    pub const fn from_address(va: VirtualAddress) -> Self {
        Self(va)
    }

    #[must_use]
    pub const fn address(self) -> VirtualAddress {
        self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache@{}", self.0)
    }
}

/// Object geometry of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLayout {
    pub object_size: u32,
    pub actual_object_size: u32,
    pub pages_per_slab: u32,
    pub slab_size: u32,
    pub objects_per_slab: u32,
    pub wasted: u32,
}

impl CacheLayout {
    /// Geometry for objects of `object_size` bytes in slabs of
    /// `pages_per_slab` pages.
    ///
    /// # Errors
    /// [`AllocError::ObjectTooLarge`] if not a single object fits a slab.
    pub const fn new(object_size: u32, pages_per_slab: u32) -> Result<Self, AllocError> {
        assert!(object_size > 0, "zero-sized objects");
        assert!(pages_per_slab > 0, "slabs need at least one page");

        let actual_object_size = if object_size < WORD { WORD } else { object_size };
        let slab_size = pages_per_slab * PAGE_SIZE;
        if actual_object_size > slab_size {
            return Err(AllocError::ObjectTooLarge {
                size: object_size,
                pages: pages_per_slab,
            });
        }

        let objects_per_slab = slab_size / actual_object_size;
        Ok(Self {
            object_size,
            actual_object_size,
            pages_per_slab,
            slab_size,
            objects_per_slab,
            wasted: slab_size - objects_per_slab * actual_object_size,
        })
    }
}

/// Links of slab records.
#[derive(Debug, Clone, Copy)]
pub struct SlabNodes<M>(pub KernelMemory<M>);

impl<M: Mmu> ListNodes for SlabNodes<M> {
    type Handle = VirtualAddress;

    fn prev(&self, node: VirtualAddress) -> VirtualAddress {
        VirtualAddress::new(self.0.read::<SlabRecord>(node).prev)
    }

    fn next(&self, node: VirtualAddress) -> VirtualAddress {
        VirtualAddress::new(self.0.read::<SlabRecord>(node).next)
    }

    fn set_prev(&self, node: VirtualAddress, prev: VirtualAddress) {
        self.0.update(node, |s: &mut SlabRecord| s.prev = prev.as_u32());
    }

    fn set_next(&self, node: VirtualAddress, next: VirtualAddress) {
        self.0.update(node, |s: &mut SlabRecord| s.next = next.as_u32());
    }
}

/// Links of cache records on the registry of all caches.
#[derive(Debug, Clone, Copy)]
pub struct CacheNodes<M>(pub KernelMemory<M>);

impl<M: Mmu> ListNodes for CacheNodes<M> {
    type Handle = VirtualAddress;

    fn prev(&self, node: VirtualAddress) -> VirtualAddress {
        VirtualAddress::new(self.0.read::<CacheRecord>(node).prev)
    }

    fn next(&self, node: VirtualAddress) -> VirtualAddress {
        VirtualAddress::new(self.0.read::<CacheRecord>(node).next)
    }

    fn set_prev(&self, node: VirtualAddress, prev: VirtualAddress) {
        self.0.update(node, |c: &mut CacheRecord| c.prev = prev.as_u32());
    }

    fn set_next(&self, node: VirtualAddress, next: VirtualAddress) {
        self.0.update(node, |c: &mut CacheRecord| c.next = next.as_u32());
    }
}

/// Write a fresh, empty cache record at `cache`.
///
/// # Panics
/// If `name` is longer than [`CACHE_NAME_LEN`] bytes.
pub fn cache_init<M: Mmu>(
    memory: &KernelMemory<M>,
    cache: CacheId,
    name: &str,
    layout: CacheLayout,
) {
    assert!(
        name.len() <= CACHE_NAME_LEN,
        "cache name {name:?} is longer than {CACHE_NAME_LEN} bytes"
    );
    let mut bytes = [0; CACHE_NAME_LEN + 4];
    bytes[..name.len()].copy_from_slice(name.as_bytes());

    memory.write(
        cache.0,
        CacheRecord {
            name: bytes,
            object_size: layout.object_size,
            actual_object_size: layout.actual_object_size,
            pages_per_slab: layout.pages_per_slab,
            slab_size: layout.slab_size,
            objects_per_slab: layout.objects_per_slab,
            wasted: layout.wasted,
            free_objects: 0,
            used_objects: 0,
            slabs: 0,
            free_slabs: 0,
            partial_slabs: 0,
            full_slabs: 0,
            free_list: 0,
            partial_list: 0,
            full_list: 0,
            prev: 0,
            next: 0,
        },
    );
}

/// Set up the slab record `slab` for `cache` over the mapped memory at
/// `base`, described by the region record `region`.
///
/// The first `already_used` objects are left out of the free list.
pub fn slab_init<M: Mmu>(
    memory: &KernelMemory<M>,
    slab: VirtualAddress,
    cache: CacheId,
    region: VirtualAddress,
    base: VirtualAddress,
    already_used: u32,
) {
    assert!(!base.is_null(), "slab at the null page");
    let c: CacheRecord = memory.read(cache.0);
    assert!(
        already_used <= c.objects_per_slab,
        "{already_used} objects do not fit a slab of {}",
        c.objects_per_slab
    );

    let free_count = c.objects_per_slab - already_used;
    let object = |i: u32| base + i * c.actual_object_size;
    for i in already_used..c.objects_per_slab {
        let next = (i + 1 < c.objects_per_slab).then(|| object(i + 1));
        memory.write_link(object(i), next);
    }

    memory.write(
        slab,
        SlabRecord {
            free_count,
            region: region.as_u32(),
            free_list: encode_address((free_count > 0).then(|| object(already_used))),
            cache: cache.0.as_u32(),
            prev: 0,
            next: 0,
        },
    );
}

/// Run `f` on the `state` list of `cache`; the head is written back.
fn with_list<M: Mmu + Copy, R>(
    memory: &KernelMemory<M>,
    cache: CacheId,
    state: SlabState,
    f: impl FnOnce(&mut CircularList<VirtualAddress>, &SlabNodes<M>) -> R,
) -> R {
    let head = memory.read::<CacheRecord>(cache.0).list_head(state);
    let mut list = CircularList::from_head(decode_address(head));
    let result = f(&mut list, &SlabNodes(*memory));
    memory.update(cache.0, |c: &mut CacheRecord| {
        *c.list_head_mut(state) = encode_address(list.head());
    });
    result
}

/// File `slab` under `cache` according to its free count and account its
/// objects.
pub fn add_slab<M: Mmu + Copy>(memory: &KernelMemory<M>, cache: CacheId, slab: VirtualAddress) {
    let s: SlabRecord = memory.read(slab);
    let objects = memory.read::<CacheRecord>(cache.0).objects_per_slab;
    let state = SlabState::of(s.free_count, objects);

    with_list(memory, cache, state, |list, nodes| list.push_head(nodes, slab));
    memory.update(cache.0, |c: &mut CacheRecord| {
        c.slabs += 1;
        *c.slab_count_mut(state) += 1;
        c.free_objects += s.free_count;
        c.used_objects += objects - s.free_count;
    });
}

/// Take `slab` off its list in `cache` and drop its objects from the counters.
pub fn remove_slab<M: Mmu + Copy>(memory: &KernelMemory<M>, cache: CacheId, slab: VirtualAddress) {
    let s: SlabRecord = memory.read(slab);
    let objects = memory.read::<CacheRecord>(cache.0).objects_per_slab;
    let state = SlabState::of(s.free_count, objects);

    with_list(memory, cache, state, |list, nodes| list.remove(nodes, slab));
    memory.update(cache.0, |c: &mut CacheRecord| {
        c.slabs -= 1;
        *c.slab_count_mut(state) -= 1;
        c.free_objects -= s.free_count;
        c.used_objects -= objects - s.free_count;
    });
}

fn move_slab<M: Mmu + Copy>(
    memory: &KernelMemory<M>,
    cache: CacheId,
    slab: VirtualAddress,
    from: SlabState,
    to: SlabState,
) {
    if from == to {
        return;
    }
    with_list(memory, cache, from, |list, nodes| list.remove(nodes, slab));
    with_list(memory, cache, to, |list, nodes| list.push_head(nodes, slab));
    memory.update(cache.0, |c: &mut CacheRecord| {
        *c.slab_count_mut(from) -= 1;
        *c.slab_count_mut(to) += 1;
    });
}

/// Pop one object from `cache`: a partial slab first, otherwise a free one.
///
/// Returns `None` if the cache has no free object.
///
/// # Panics
/// If the chosen slab's free list is empty.
pub fn take_object<M: Mmu + Copy>(
    memory: &KernelMemory<M>,
    cache: CacheId,
) -> Option<VirtualAddress> {
    let c: CacheRecord = memory.read(cache.0);
    let slab = decode_address(c.partial_list).or_else(|| decode_address(c.free_list))?;

    let s: SlabRecord = memory.read(slab);
    let before = SlabState::of(s.free_count, c.objects_per_slab);
    let Some(object) = decode_address(s.free_list).filter(|_| s.free_count > 0) else {
        panic!("slab {slab} of cache {:?} yields no object", c.name());
    };

    let next = memory.read_link(object);
    memory.update(slab, |s: &mut SlabRecord| {
        s.free_list = encode_address(next);
        s.free_count -= 1;
    });
    memory.update(cache.0, |c: &mut CacheRecord| {
        c.free_objects -= 1;
        c.used_objects += 1;
    });
    let after = SlabState::of(s.free_count - 1, c.objects_per_slab);
    move_slab(memory, cache, slab, before, after);
    Some(object)
}

/// Whether `object` is on `slab`'s free list already.
fn is_free<M: Mmu>(memory: &KernelMemory<M>, s: &SlabRecord, object: VirtualAddress) -> bool {
    let mut link = decode_address(s.free_list);
    for _ in 0..s.free_count {
        match link {
            Some(free) if free == object => return true,
            Some(free) => link = memory.read_link(free),
            None => break,
        }
    }
    false
}

/// Push `object` back onto `slab`'s free list and re-file the slab.
///
/// # Panics
/// If `object` does not belong to `slab` of `cache`, is not on an object
/// boundary, is free already, or the slab has no object in use.
pub fn give_object<M: Mmu + Copy>(
    memory: &KernelMemory<M>,
    cache: CacheId,
    slab: VirtualAddress,
    base: VirtualAddress,
    object: VirtualAddress,
) {
    let c: CacheRecord = memory.read(cache.0);
    let s: SlabRecord = memory.read(slab);
    assert_eq!(
        s.cache(),
        Some(cache.0),
        "{object} belongs to another cache than {:?}",
        c.name()
    );

    let offset = object.as_u32().wrapping_sub(base.as_u32());
    assert!(
        object >= base
            && offset % c.actual_object_size == 0
            && offset / c.actual_object_size < c.objects_per_slab,
        "{object} is not an object of cache {:?}",
        c.name()
    );
    assert!(
        s.free_count < c.objects_per_slab,
        "freeing {object} into slab {slab} without used objects"
    );
    assert!(!is_free(memory, &s, object), "double free of {object}");

    let before = SlabState::of(s.free_count, c.objects_per_slab);
    memory.write_link(object, decode_address(s.free_list));
    memory.update(slab, |s: &mut SlabRecord| {
        s.free_list = object.as_u32();
        s.free_count += 1;
    });
    memory.update(cache.0, |c: &mut CacheRecord| {
        c.free_objects += 1;
        c.used_objects -= 1;
    });
    let after = SlabState::of(s.free_count + 1, c.objects_per_slab);
    move_slab(memory, cache, slab, before, after);
}

/// First slab without used objects, if any.
#[must_use]
pub fn first_free_slab<M: Mmu>(
    memory: &KernelMemory<M>,
    cache: CacheId,
) -> Option<VirtualAddress> {
    decode_address(memory.read::<CacheRecord>(cache.0).free_list)
}

/// Slabs of `cache` in the given state.
#[must_use]
pub fn slabs<M: Mmu + Copy>(
    memory: &KernelMemory<M>,
    cache: CacheId,
    state: SlabState,
) -> crate::list::Iter<SlabNodes<M>> {
    let head = memory.read::<CacheRecord>(cache.0).list_head(state);
    CircularList::from_head(decode_address(head)).iter(SlabNodes(*memory))
}

/// Log the counters of `cache`.
pub fn dump_cache<M: Mmu>(memory: &KernelMemory<M>, cache: CacheId) {
    let c: CacheRecord = memory.read(cache.0);
    debug!(
        "cache {:?}: object {} ({} actual) bytes, {} page(s) per slab, \
         {} objects per slab, {} bytes wasted",
        c.name(),
        c.object_size,
        c.actual_object_size,
        c.pages_per_slab,
        c.objects_per_slab,
        c.wasted
    );
    debug!(
        "  objects: {} free, {} used; slabs: {} ({} free, {} partial, {} full)",
        c.free_objects, c.used_objects, c.slabs, c.free_slabs, c.partial_slabs, c.full_slabs
    );
}
