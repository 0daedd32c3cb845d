//! # Kernel virtual regions
//!
//! Ranges of kernel virtual pages, each described by a [`Region`] record in
//! kernel memory. A record sits on exactly one of two singly linked lists,
//! both kept in ascending address order without overlap:
//!
//! ```text
//! free: [C0119..C011F] -> [C0130..C03FF]
//! used: [C0116] -> [C0117] -> [C0118] -> [C0120..C012F]
//! ```
//!
//! Records come from the region-record object cache. This module never
//! allocates one itself: splitting asks the caller for a fresh record and
//! merging hands the absorbed record back.

use crate::memory::{KernelMemory, Record, decode_address, encode_address};
use core::fmt;
use kernel_memory_addresses::{VirtualAddress, VirtualPageNumber};
use kernel_vmem::Mmu;
use log::{debug, trace};

/// A range of virtual pages.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    first_page: u32,
    pages: u32,
    next: u32,
}

unsafe impl Record for Region {}

/// Size of one region record.
pub const REGION_RECORD_SIZE: u32 = 12;

const _: () = assert!(size_of::<Region>() == REGION_RECORD_SIZE as usize);

impl Region {
    /// A detached region of `pages` pages starting at `first`.
    #[must_use]
    pub const fn new(first: VirtualPageNumber, pages: u32) -> Self {
        Self {
            first_page: first.as_u32(),
            pages,
            next: 0,
        }
    }

    #[must_use]
    pub const fn first_page(&self) -> VirtualPageNumber {
        VirtualPageNumber::new(self.first_page)
    }

    #[must_use]
    pub const fn pages(&self) -> u32 {
        self.pages
    }

    /// Last page of the region (inclusive).
    #[must_use]
    pub const fn last_page(&self) -> VirtualPageNumber {
        VirtualPageNumber::new(self.first_page + self.pages - 1)
    }

    /// First page after the region.
    #[must_use]
    pub const fn end(&self) -> VirtualPageNumber {
        VirtualPageNumber::new(self.first_page + self.pages)
    }

    #[must_use]
    pub const fn contains(&self, page: VirtualPageNumber) -> bool {
        page.as_u32() >= self.first_page && page.as_u32() - self.first_page < self.pages
    }

    /// Address of the first byte of the region.
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.first_page().base()
    }

    /// The same range, linked to `next`.
    #[must_use]
    pub const fn with_next(self, next: Option<RegionId>) -> Self {
        Self {
            next: match next {
                Some(region) => region.0.as_u32(),
                None => 0,
            },
            ..self
        }
    }

    const fn next(&self) -> Option<RegionId> {
        match decode_address(self.next) {
            Some(va) => Some(RegionId(va)),
            None => None,
        }
    }
}

/// Handle of a region record: the record's kernel virtual address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(VirtualAddress);

impl RegionId {
    #[must_use]
    pub const fn from_address(va: VirtualAddress) -> Self {
        Self(va)
    }

    #[must_use]
    pub const fn address(self) -> VirtualAddress {
        self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region@{}", self.0)
    }
}

fn encode_region(region: Option<RegionId>) -> u32 {
    encode_address(region.map(RegionId::address))
}

/// The free and used region lists.
pub struct VirtualRegions<M> {
    memory: KernelMemory<M>,
    free: Option<RegionId>,
    used: Option<RegionId>,
}

impl<M: Mmu + Copy> VirtualRegions<M> {
    /// Empty lists; [`boot`](Self::boot) installs the initial regions.
    #[must_use]
    pub const fn new(memory: KernelMemory<M>) -> Self {
        Self {
            memory,
            free: None,
            used: None,
        }
    }

    /// Take over the regions handed out during boot (`used`, a chain of
    /// records) and make `[first, last]` the only free region, described by
    /// the record `free`.
    ///
    /// # Panics
    /// If regions were installed before, if the boot regions are not
    /// strictly ascending and disjoint, or if the free range is empty or
    /// starts below a boot region.
    pub fn boot(
        &mut self,
        used: Option<RegionId>,
        free: RegionId,
        first: VirtualPageNumber,
        last: VirtualPageNumber,
    ) {
        assert!(
            self.free.is_none() && self.used.is_none(),
            "virtual regions are already set up"
        );

        let mut end: Option<VirtualPageNumber> = None;
        for region in (Regions {
            memory: self.memory,
            next: used,
        }) {
            let r = self.record(region);
            assert!(r.pages > 0, "boot {region} is empty");
            if let Some(end) = end {
                assert!(
                    r.first_page() >= end,
                    "boot region at {} overlaps or precedes its predecessor",
                    r.first_page()
                );
            }
            end = Some(r.end());
        }

        assert!(first <= last, "empty virtual range {first}..={last}");
        if let Some(end) = end {
            assert!(first >= end, "free range at {first} overlaps the boot regions");
        }

        self.memory.write(free.0, Region::new(first, last - first + 1));
        self.free = Some(free);
        self.used = used;
        debug!("virtual regions: free {first}..={last}");
    }

    /// The record behind `region`.
    #[must_use]
    pub fn record(&self, region: RegionId) -> Region {
        self.memory.read(region.0)
    }

    fn set_next(&self, region: RegionId, next: Option<RegionId>) {
        self.memory
            .update(region.0, |r: &mut Region| r.next = encode_region(next));
    }

    /// Grant `pages` pages from the first free region large enough.
    ///
    /// A larger match is split and `take` supplies the record for the
    /// remainder, which stays on the free list in the match's place.
    /// Returns `None` when nothing fits.
    pub fn alloc(&mut self, pages: u32, take: impl FnOnce() -> RegionId) -> Option<RegionId> {
        assert!(pages > 0, "allocating an empty region");

        let (prev, region) = self.first_fit(pages)?;
        if self.record(region).pages > pages {
            self.split(region, pages, take);
        }

        let next = self.record(region).next();
        match prev {
            Some(prev) => self.set_next(prev, next),
            None => self.free = next,
        }
        self.used = self.insert_sorted(self.used, region);

        trace!("allocated {pages} pages at {}", self.record(region).first_page());
        Some(region)
    }

    fn first_fit(&self, pages: u32) -> Option<(Option<RegionId>, RegionId)> {
        let mut prev = None;
        for region in self.free_regions() {
            if self.record(region).pages >= pages {
                return Some((prev, region));
            }
            prev = Some(region);
        }
        None
    }

    /// Shrink `region` to its first `pages` pages; the rest goes into the
    /// record supplied by `take`, linked right behind `region`.
    ///
    /// # Panics
    /// Unless `0 < pages < region.pages()`.
    pub fn split(&self, region: RegionId, pages: u32, take: impl FnOnce() -> RegionId) -> RegionId {
        let r = self.record(region);
        assert!(
            pages > 0 && pages < r.pages,
            "cannot split {pages} pages off a region of {}",
            r.pages
        );

        let rest = take();
        self.memory.write(
            rest.0,
            Region {
                first_page: r.first_page + pages,
                pages: r.pages - pages,
                next: r.next,
            },
        );
        self.memory.write(
            region.0,
            Region {
                pages,
                next: rest.0.as_u32(),
                ..r
            },
        );
        rest
    }

    /// Extend `a` by its list successor `b` and hand `b`'s record to
    /// `release`.
    ///
    /// # Panics
    /// If `b` does not follow `a` on its list or the ranges are not adjacent.
    pub fn merge(&self, a: RegionId, b: RegionId, release: impl FnOnce(RegionId)) {
        let (ra, rb) = (self.record(a), self.record(b));
        assert_eq!(ra.next(), Some(b), "{b} does not follow {a}");
        assert_eq!(ra.end(), rb.first_page(), "{a} and {b} are not adjacent");

        self.memory.write(
            a.0,
            Region {
                pages: ra.pages + rb.pages,
                next: rb.next,
                ..ra
            },
        );
        release(b);
    }

    /// Give a used region back, merging it with adjacent free neighbours.
    /// Records absorbed by a merge go to `release`.
    ///
    /// # Panics
    /// If `region` is not on the used list.
    pub fn free(&mut self, region: RegionId, mut release: impl FnMut(RegionId)) {
        let Some(prev) = self.predecessor(self.used, region) else {
            panic!("{region} is not an allocated region");
        };
        let next = self.record(region).next();
        match prev {
            Some(prev) => self.set_next(prev, next),
            None => self.used = next,
        }

        let r = self.record(region);
        self.free = self.insert_sorted(self.free, region);

        if let Some(next) = self.record(region).next()
            && self.record(next).first_page() == r.end()
        {
            self.merge(region, next, &mut release);
        }
        if let Some(Some(prev)) = self.predecessor(self.free, region)
            && self.record(prev).end() == r.first_page()
        {
            self.merge(prev, region, &mut release);
        }

        trace!("freed {} pages at {}", r.pages, r.first_page());
    }

    /// `Some(predecessor)` of `region` on the list starting at `head`
    /// (`Some(None)` for the head itself), `None` if it is not listed.
    fn predecessor(&self, head: Option<RegionId>, region: RegionId) -> Option<Option<RegionId>> {
        let mut prev = None;
        for candidate in (Regions {
            memory: self.memory,
            next: head,
        }) {
            if candidate == region {
                return Some(prev);
            }
            prev = Some(candidate);
        }
        None
    }

    /// Insert `region` into the list at `head` by address; returns the new head.
    fn insert_sorted(&self, head: Option<RegionId>, region: RegionId) -> Option<RegionId> {
        let r = self.record(region);
        let mut prev: Option<RegionId> = None;
        let mut cursor = head;
        while let Some(current) = cursor {
            let c = self.record(current);
            if c.first_page() > r.first_page() {
                break;
            }
            prev = Some(current);
            cursor = c.next();
        }

        if let Some(prev) = prev {
            assert!(
                self.record(prev).end() <= r.first_page(),
                "{region} overlaps {prev}"
            );
        }
        if let Some(next) = cursor {
            assert!(
                r.end() <= self.record(next).first_page(),
                "{region} overlaps {next}"
            );
        }

        self.set_next(region, cursor);
        match prev {
            Some(prev) => {
                self.set_next(prev, Some(region));
                head
            }
            None => Some(region),
        }
    }

    /// The used region containing `page`.
    #[must_use]
    pub fn find(&self, page: VirtualPageNumber) -> Option<RegionId> {
        self.used_regions()
            .find(|&region| self.record(region).contains(page))
    }

    #[must_use]
    pub fn free_regions(&self) -> Regions<M> {
        Regions {
            memory: self.memory,
            next: self.free,
        }
    }

    #[must_use]
    pub fn used_regions(&self) -> Regions<M> {
        Regions {
            memory: self.memory,
            next: self.used,
        }
    }

    #[must_use]
    pub fn free_pages(&self) -> u32 {
        self.free_regions().map(|r| self.record(r).pages).sum()
    }

    #[must_use]
    pub fn used_pages(&self) -> u32 {
        self.used_regions().map(|r| self.record(r).pages).sum()
    }

    pub fn dump(&self) {
        debug!("free virtual regions:");
        for region in self.free_regions() {
            let r = self.record(region);
            debug!("  {}..={} ({} pages)", r.first_page(), r.last_page(), r.pages);
        }
        debug!("used virtual regions:");
        for region in self.used_regions() {
            let r = self.record(region);
            debug!("  {}..={} ({} pages)", r.first_page(), r.last_page(), r.pages);
        }
    }
}

/// Walks a region list from its head.
pub struct Regions<M> {
    memory: KernelMemory<M>,
    next: Option<RegionId>,
}

impl<M: Mmu> Iterator for Regions<M> {
    type Item = RegionId;

    fn next(&mut self) -> Option<RegionId> {
        let current = self.next?;
        self.next = self.memory.read::<Region>(current.0).next();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::{Cell, RefCell};
    use kernel_vmem::testing::SimulatedMachine;

    /// Hands out consecutive record slots; paging is off so any address works.
    struct Records {
        next: Cell<u32>,
        released: RefCell<Vec<RegionId>>,
    }

    impl Records {
        fn new() -> Self {
            Self {
                next: Cell::new(0x1000),
                released: RefCell::new(Vec::new()),
            }
        }

        fn take(&self) -> RegionId {
            let va = self.next.get();
            self.next.set(va + REGION_RECORD_SIZE);
            RegionId::from_address(VirtualAddress::new(va))
        }

        fn release(&self, region: RegionId) {
            self.released.borrow_mut().push(region);
        }
    }

    fn hundred_pages<'m>(
        machine: &'m SimulatedMachine,
        records: &Records,
    ) -> VirtualRegions<&'m SimulatedMachine> {
        let mut regions = VirtualRegions::new(KernelMemory::new(machine));
        regions.boot(None, records.take(), VirtualPageNumber::new(0), VirtualPageNumber::new(99));
        regions
    }

    fn ranges(
        regions: &VirtualRegions<&SimulatedMachine>,
        list: Regions<&SimulatedMachine>,
    ) -> Vec<(u32, u32)> {
        list.map(|id| {
            let r = regions.record(id);
            (r.first_page().as_u32(), r.last_page().as_u32())
        })
        .collect()
    }

    fn assert_sorted_and_disjoint(regions: &VirtualRegions<&SimulatedMachine>) {
        for list in [regions.free_regions(), regions.used_regions()] {
            let r = ranges(regions, list);
            for pair in r.windows(2) {
                assert!(pair[0].1 < pair[1].0, "{pair:?}");
            }
        }
        let free = ranges(regions, regions.free_regions());
        for pair in free.windows(2) {
            assert!(pair[0].1 + 1 < pair[1].0, "adjacent free ranges {pair:?}");
        }
    }

    #[test]
    fn alloc_splits_first_free_region() {
        let machine = SimulatedMachine::new(64 * 1024);
        let records = Records::new();
        let mut regions = hundred_pages(&machine, &records);

        let region = regions.alloc(10, || records.take()).expect("fits");
        assert_eq!(regions.record(region).first_page(), VirtualPageNumber::new(0));
        assert_eq!(ranges(&regions, regions.used_regions()), [(0, 9)]);
        assert_eq!(ranges(&regions, regions.free_regions()), [(10, 99)]);
        assert_eq!(regions.free_pages() + regions.used_pages(), 100);
    }

    #[test]
    fn exact_fit_needs_no_record() {
        let machine = SimulatedMachine::new(64 * 1024);
        let records = Records::new();
        let mut regions = hundred_pages(&machine, &records);

        let region = regions
            .alloc(100, || panic!("no split expected"))
            .expect("fits");
        assert_eq!(regions.record(region).pages(), 100);
        assert_eq!(regions.free_regions().count(), 0);
        assert_eq!(regions.alloc(1, || records.take()), None);
    }

    #[test]
    fn first_fit_skips_small_holes() {
        let machine = SimulatedMachine::new(64 * 1024);
        let records = Records::new();
        let mut regions = hundred_pages(&machine, &records);

        let a = regions.alloc(10, || records.take()).expect("a");
        let _b = regions.alloc(20, || records.take()).expect("b");
        let _c = regions.alloc(30, || records.take()).expect("c");
        regions.free(a, |r| records.release(r));
        assert_eq!(ranges(&regions, regions.free_regions()), [(0, 9), (60, 99)]);

        let d = regions.alloc(15, || records.take()).expect("d");
        assert_eq!(regions.record(d).first_page(), VirtualPageNumber::new(60));
        let e = regions.alloc(10, || records.take()).expect("e");
        assert_eq!(regions.record(e).first_page(), VirtualPageNumber::new(0));
        assert_sorted_and_disjoint(&regions);
    }

    #[test]
    fn free_coalesces_with_both_neighbours() {
        let machine = SimulatedMachine::new(64 * 1024);
        let records = Records::new();
        let mut regions = hundred_pages(&machine, &records);

        let a = regions.alloc(10, || records.take()).expect("a");
        let b = regions.alloc(10, || records.take()).expect("b");
        let c = regions.alloc(10, || records.take()).expect("c");

        regions.free(a, |r| records.release(r));
        regions.free(c, |r| records.release(r));
        assert_eq!(ranges(&regions, regions.free_regions()), [(0, 9), (20, 99)]);

        regions.free(b, |r| records.release(r));
        assert_eq!(ranges(&regions, regions.free_regions()), [(0, 99)]);
        assert_eq!(regions.used_regions().count(), 0);
        // The three remainders created by the splits were absorbed.
        assert_eq!(records.released.borrow().len(), 3);
        assert_eq!(regions.free_regions().next(), Some(a));
    }

    #[test]
    fn free_list_never_holds_adjacent_ranges() {
        let machine = SimulatedMachine::new(64 * 1024);
        let records = Records::new();
        let mut regions = hundred_pages(&machine, &records);

        let live: Vec<RegionId> = (1..=8)
            .map(|n| regions.alloc(n, || records.take()).expect("fits"))
            .collect();
        for index in [3, 0, 5, 1, 6, 2, 7, 4] {
            let region = live[index];
            regions.free(region, |r| records.release(r));
            assert_sorted_and_disjoint(&regions);
            assert_eq!(regions.free_pages() + regions.used_pages(), 100);
        }
        assert_eq!(ranges(&regions, regions.free_regions()), [(0, 99)]);
    }

    #[test]
    fn split_keeps_base_and_links_rest() {
        let machine = SimulatedMachine::new(64 * 1024);
        let records = Records::new();
        let regions = hundred_pages(&machine, &records);

        let head = regions.free_regions().next().expect("free region");
        let rest = regions.split(head, 30, || records.take());
        let (h, r) = (regions.record(head), regions.record(rest));
        assert_eq!((h.first_page().as_u32(), h.pages()), (0, 30));
        assert_eq!((r.first_page().as_u32(), r.pages()), (30, 70));
        assert_eq!(h.end(), r.first_page());
        assert_eq!(ranges(&regions, regions.free_regions()), [(0, 29), (30, 99)]);
    }

    #[test]
    fn find_locates_used_region() {
        let machine = SimulatedMachine::new(64 * 1024);
        let records = Records::new();
        let mut regions = hundred_pages(&machine, &records);

        let _a = regions.alloc(4, || records.take()).expect("a");
        let b = regions.alloc(4, || records.take()).expect("b");
        assert_eq!(regions.find(VirtualPageNumber::new(6)), Some(b));
        assert_eq!(regions.find(VirtualPageNumber::new(50)), None);
    }

    #[test]
    fn boot_accepts_ascending_used_chain() {
        let machine = SimulatedMachine::new(64 * 1024);
        let memory = KernelMemory::new(&machine);
        let records = Records::new();
        let (a, b) = (records.take(), records.take());
        memory.write(a.address(), Region::new(VirtualPageNumber::new(10), 1).with_next(Some(b)));
        memory.write(b.address(), Region::new(VirtualPageNumber::new(11), 2));

        let mut regions = VirtualRegions::new(memory);
        let (first, last) = (VirtualPageNumber::new(13), VirtualPageNumber::new(20));
        regions.boot(Some(a), records.take(), first, last);
        assert_eq!(ranges(&regions, regions.used_regions()), [(10, 10), (11, 12)]);
        assert_eq!(ranges(&regions, regions.free_regions()), [(13, 20)]);
    }

    #[test]
    #[should_panic(expected = "overlaps or precedes")]
    fn boot_rejects_overlapping_used_chain() {
        let machine = SimulatedMachine::new(64 * 1024);
        let memory = KernelMemory::new(&machine);
        let records = Records::new();
        let (a, b) = (records.take(), records.take());
        memory.write(a.address(), Region::new(VirtualPageNumber::new(10), 2).with_next(Some(b)));
        memory.write(b.address(), Region::new(VirtualPageNumber::new(11), 1));

        let mut regions = VirtualRegions::new(memory);
        let (first, last) = (VirtualPageNumber::new(13), VirtualPageNumber::new(20));
        regions.boot(Some(a), records.take(), first, last);
    }

    #[test]
    #[should_panic(expected = "cannot split")]
    fn split_of_whole_region_panics() {
        let machine = SimulatedMachine::new(64 * 1024);
        let records = Records::new();
        let regions = hundred_pages(&machine, &records);
        let head = regions.free_regions().next().expect("free region");
        regions.split(head, 100, || records.take());
    }

    #[test]
    #[should_panic(expected = "not an allocated region")]
    fn freeing_free_region_panics() {
        let machine = SimulatedMachine::new(64 * 1024);
        let records = Records::new();
        let mut regions = hundred_pages(&machine, &records);
        let head = regions.free_regions().next().expect("free region");
        regions.free(head, |r| records.release(r));
    }

    #[test]
    #[should_panic(expected = "not adjacent")]
    fn merging_distant_regions_panics() {
        let machine = SimulatedMachine::new(64 * 1024);
        let records = Records::new();
        let mut regions = hundred_pages(&machine, &records);
        let _a = regions.alloc(10, || records.take()).expect("a");
        let b = regions.alloc(10, || records.take()).expect("b");
        let _c = regions.alloc(10, || records.take()).expect("c");
        let _d = regions.alloc(10, || records.take()).expect("d");
        regions.free(b, |r| records.release(r));
        // Free list is now [10..19] -> [40..99].
        let mut free = regions.free_regions();
        let (first, second) = (free.next().expect("first"), free.next().expect("second"));
        regions.merge(first, second, |r| records.release(r));
    }
}
