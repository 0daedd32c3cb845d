//! # Physical page allocator (buddy system)
//!
//! Every managed frame has a [`PageDescriptor`] in a dense table in kernel
//! memory. Free and used blocks of 2^order frames sit on one circular list
//! per order and state, linked through their head descriptors.
//!
//! ```text
//! order 2:  [ 0 1 2 3 ][ 4 5 6 7 ]      buddy(4, 2) = 4 ^ 0b100 = 0
//! order 3:  [ 0 1 2 3 4 5 6 7 ]         merged head = 4 & !0b100 = 0
//! ```
//!
//! A block of order `k` always starts at a frame number divisible by 2^k
//! (absolute frame numbers, not relative to the table), so the buddy of a
//! block is found by flipping bit `k`.

use crate::error::AllocError;
use crate::list::{CircularList, Iter, ListNodes};
use crate::memory::{KernelMemory, Record, decode_address, encode_address};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PageFrameNumber, VirtualAddress, VirtualPageNumber};
use kernel_vmem::{FrameAlloc, Mmu};
use log::{debug, trace};

/// Number of block orders; the largest block has 2^(MAX_BLOCK_ORDER - 1) frames.
pub const MAX_BLOCK_ORDER: usize = 10;

const NIL: u32 = u32::MAX;

/// Head flag and order of a descriptor.
#[bitfield(u32)]
pub struct BlockBits {
    /// The frame is the first of its block.
    pub head: bool,

    /// Order of the block; meaningless unless `head` is set.
    #[bits(8)]
    pub order: u8,

    #[bits(23)]
    _reserved: u32,
}

impl BlockBits {
    #[allow(clippy::cast_possible_truncation)] // order < MAX_BLOCK_ORDER
    const fn head_of_order(order: usize) -> Self {
        Self::new().with_head(true).with_order(order as u8)
    }
}

/// Bookkeeping for one physical frame.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PageDescriptor {
    /// Reference count of the block (heads only); `0` means free.
    count: u32,
    block: BlockBits,
    /// Slab record the frame backs, `0` for none.
    slab: u32,
    /// Virtual page the frame is mapped at by its owner, `0` for none.
    mapping: u32,
    prev: u32,
    next: u32,
}

unsafe impl Record for PageDescriptor {}

/// Size of one descriptor in the table.
pub const DESCRIPTOR_SIZE: u32 = 24;

const _: () = assert!(size_of::<PageDescriptor>() == DESCRIPTOR_SIZE as usize);

impl PageDescriptor {
    const EMPTY: Self = Self {
        count: 0,
        block: BlockBits::new(),
        slab: 0,
        mapping: 0,
        prev: NIL,
        next: NIL,
    };

    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub const fn is_head(&self) -> bool {
        self.block.head()
    }

    #[must_use]
    pub const fn order(&self) -> usize {
        self.block.order() as usize
    }
}

/// Whether a run of frames enters the allocator as free or as used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Free,
    Used,
}

/// The descriptor table: a view of kernel memory indexed by frame number.
#[derive(Debug, Clone, Copy)]
pub struct Descriptors<M> {
    memory: KernelMemory<M>,
    table: VirtualAddress,
    first: PageFrameNumber,
    frames: u32,
}

impl<M: Mmu> Descriptors<M> {
    #[must_use]
    pub fn contains(&self, frame: PageFrameNumber) -> bool {
        frame >= self.first && frame - self.first < self.frames
    }

    fn address(&self, frame: PageFrameNumber) -> VirtualAddress {
        assert!(self.contains(frame), "{frame} is not a managed frame");
        self.table + (frame - self.first) * DESCRIPTOR_SIZE
    }

    #[must_use]
    pub fn get(&self, frame: PageFrameNumber) -> PageDescriptor {
        self.memory.read(self.address(frame))
    }

    fn set(&self, frame: PageFrameNumber, descriptor: PageDescriptor) {
        self.memory.write(self.address(frame), descriptor);
    }

    fn update<R>(&self, frame: PageFrameNumber, f: impl FnOnce(&mut PageDescriptor) -> R) -> R {
        self.memory.update(self.address(frame), f)
    }
}

impl<M: Mmu> ListNodes for Descriptors<M> {
    type Handle = PageFrameNumber;

    fn prev(&self, node: PageFrameNumber) -> PageFrameNumber {
        PageFrameNumber::new(self.get(node).prev)
    }

    fn next(&self, node: PageFrameNumber) -> PageFrameNumber {
        PageFrameNumber::new(self.get(node).next)
    }

    fn set_prev(&self, node: PageFrameNumber, prev: PageFrameNumber) {
        self.update(node, |d| d.prev = prev.as_u32());
    }

    fn set_next(&self, node: PageFrameNumber, next: PageFrameNumber) {
        self.update(node, |d| d.next = next.as_u32());
    }
}

/// Snapshot of the allocator's lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    pub free_frames: u32,
    pub used_frames: u32,
    pub free_blocks: [u32; MAX_BLOCK_ORDER],
    pub used_blocks: [u32; MAX_BLOCK_ORDER],
}

/// Buddy allocator over the frames `[first, first + frames)`.
pub struct PhysicalPages<M> {
    descriptors: Descriptors<M>,
    order_count: usize,
    free: [CircularList<PageFrameNumber>; MAX_BLOCK_ORDER],
    used: [CircularList<PageFrameNumber>; MAX_BLOCK_ORDER],
}

impl<M: Mmu + Copy> PhysicalPages<M> {
    /// Bytes of descriptor table needed for `frames` frames.
    #[must_use]
    pub const fn table_size(frames: u32) -> u32 {
        frames * DESCRIPTOR_SIZE
    }

    /// Take over the (mapped) descriptor table at `table` for `frames` frames
    /// starting at `first`, using block orders `0..order_count`.
    ///
    /// All descriptors start out detached; [`add_run`](Self::add_run) hands
    /// the frames to the lists.
    ///
    /// # Panics
    /// If `order_count` is not in `1..=MAX_BLOCK_ORDER`.
    pub fn new(
        memory: KernelMemory<M>,
        table: VirtualAddress,
        first: PageFrameNumber,
        frames: u32,
        order_count: usize,
    ) -> Self {
        assert!(
            (1..=MAX_BLOCK_ORDER).contains(&order_count),
            "{order_count} block orders requested, at most {MAX_BLOCK_ORDER} supported"
        );

        let descriptors = Descriptors {
            memory,
            table,
            first,
            frames,
        };
        for i in 0..frames {
            descriptors.set(first + i, PageDescriptor::EMPTY);
        }

        debug!("page descriptors for {frames} frames from {first} at {table}");
        Self {
            descriptors,
            order_count,
            free: [CircularList::new(); MAX_BLOCK_ORDER],
            used: [CircularList::new(); MAX_BLOCK_ORDER],
        }
    }

    #[must_use]
    pub const fn descriptors(&self) -> &Descriptors<M> {
        &self.descriptors
    }

    #[must_use]
    pub const fn first_frame(&self) -> PageFrameNumber {
        self.descriptors.first
    }

    #[must_use]
    pub const fn managed_frames(&self) -> u32 {
        self.descriptors.frames
    }

    #[must_use]
    pub const fn order_count(&self) -> usize {
        self.order_count
    }

    /// Frames in the largest block.
    #[must_use]
    pub const fn largest_block(&self) -> u32 {
        1 << (self.order_count - 1)
    }

    /// Hand the frames `[start, end)` to the allocator, cut into the largest
    /// aligned blocks that fit.
    #[allow(clippy::cast_possible_truncation)] // order < MAX_BLOCK_ORDER
    pub fn add_run(&mut self, start: PageFrameNumber, end: PageFrameNumber, status: FrameStatus) {
        let mut frame = start;
        while frame < end {
            let order = (0..self.order_count)
                .rev()
                .find(|&order| {
                    frame.is_aligned_to_order(order as u32) && end - frame >= 1 << order
                })
                .unwrap_or(0);
            self.init_block(frame, order, status);
            frame += 1 << order;
        }
    }

    fn init_block(&mut self, head: PageFrameNumber, order: usize, status: FrameStatus) {
        let count = match status {
            FrameStatus::Free => 0,
            FrameStatus::Used => 1,
        };
        for i in 1..(1u32 << order) {
            self.descriptors.set(head + i, PageDescriptor::EMPTY);
        }
        self.descriptors.set(
            head,
            PageDescriptor {
                count,
                block: BlockBits::head_of_order(order),
                ..PageDescriptor::EMPTY
            },
        );
        match status {
            FrameStatus::Free => self.free[order].push_tail(&self.descriptors, head),
            FrameStatus::Used => self.used[order].push_tail(&self.descriptors, head),
        }
    }

    /// Allocate 2^`order` contiguous frames; returns the first.
    ///
    /// # Errors
    /// [`AllocError::OutOfFrames`] if no block of `order` or above is free.
    ///
    /// # Panics
    /// If `order` is not below the configured order count.
    pub fn alloc_block(&mut self, order: usize) -> Result<PageFrameNumber, AllocError> {
        assert!(
            order < self.order_count,
            "block order {order} out of range (largest is {})",
            self.order_count - 1
        );

        let head = self.take_free(order).ok_or(AllocError::OutOfFrames)?;
        self.descriptors.update(head, |d| {
            d.count = 1;
            d.block = BlockBits::head_of_order(order);
        });
        self.used[order].push_head(&self.descriptors, head);

        trace!("allocated block {head} of order {order}");
        Ok(head)
    }

    /// Detach a free block of `order`, splitting a larger one if needed.
    fn take_free(&mut self, order: usize) -> Option<PageFrameNumber> {
        if let Some(head) = self.free[order].pop_head(&self.descriptors) {
            return Some(head);
        }
        if order + 1 >= self.order_count {
            return None;
        }

        let block = self.take_free(order + 1)?;
        let upper = block + (1 << order);
        self.descriptors.update(upper, |d| {
            d.count = 0;
            d.block = BlockBits::head_of_order(order);
        });
        self.free[order].push_head(&self.descriptors, upper);
        Some(block)
    }

    /// Return the block at `head`, merging it with free buddies.
    ///
    /// # Panics
    /// Unless `head` is a used block head of exactly `order` with reference
    /// count 1 and neither slab nor mapping attached.
    pub fn free_block(&mut self, head: PageFrameNumber, order: usize) {
        let d = self.descriptors.get(head);
        assert!(d.is_head(), "{head} is not the head of a block");
        assert!(d.count != 0, "double free of block {head}");
        assert_eq!(d.order(), order, "{head} heads a block of order {}, not {order}", d.order());
        assert_eq!(d.count, 1, "{head} is still referenced {} times", d.count);
        assert!(
            d.slab == 0 && d.mapping == 0,
            "{head} is still attached to a slab or a mapping"
        );

        self.used[order].remove(&self.descriptors, head);

        let (mut head, mut order) = (head, order);
        while order + 1 < self.order_count {
            let buddy = PageFrameNumber::new(head.as_u32() ^ (1 << order));
            if !self.descriptors.contains(buddy) {
                break;
            }
            let b = self.descriptors.get(buddy);
            if !(b.is_head() && b.count == 0 && b.order() == order) {
                break;
            }

            self.free[order].remove(&self.descriptors, buddy);
            self.descriptors.update(head.max(buddy), |d| d.block.set_head(false));
            head = head.min(buddy);
            order += 1;
        }

        self.descriptors.update(head, |d| {
            d.count = 0;
            d.block = BlockBits::head_of_order(order);
        });
        self.free[order].push_head(&self.descriptors, head);
        trace!("freed into block {head} of order {order}");
    }

    /// Allocate at least `count` contiguous frames (rounded up to a block).
    ///
    /// # Errors
    /// [`AllocError::OutOfFrames`] if no block that large is free.
    ///
    /// # Panics
    /// If `count` is zero or exceeds [`largest_block`](Self::largest_block).
    pub fn alloc_n(&mut self, count: u32) -> Result<PageFrameNumber, AllocError> {
        assert!(count > 0, "allocating zero frames");
        assert!(
            count <= self.largest_block(),
            "{count} frames exceed the largest block of {} frames",
            self.largest_block()
        );
        self.alloc_block(count.next_power_of_two().trailing_zeros() as usize)
    }

    /// Allocate a single frame.
    ///
    /// # Errors
    /// [`AllocError::OutOfFrames`] when memory is exhausted.
    pub fn alloc_frame(&mut self) -> Result<PageFrameNumber, AllocError> {
        self.alloc_block(0)
    }

    pub fn free_frame(&mut self, frame: PageFrameNumber) {
        self.free_block(frame, 0);
    }

    fn head_descriptor(&self, head: PageFrameNumber) -> PageDescriptor {
        let d = self.descriptors.get(head);
        assert!(d.is_head(), "{head} is not the head of a block");
        d
    }

    /// Take another reference on the used block at `head`.
    pub fn ref_frame(&mut self, head: PageFrameNumber) {
        let d = self.head_descriptor(head);
        assert!(d.count != 0, "referencing free block {head}");
        self.descriptors.update(head, |d| d.count += 1);
    }

    /// Drop a reference; the last one frees the block at its recorded order.
    pub fn unref_frame(&mut self, head: PageFrameNumber) {
        let d = self.head_descriptor(head);
        match d.count {
            0 => panic!("unreferencing free block {head}"),
            1 => self.free_block(head, d.order()),
            _ => self.descriptors.update(head, |d| d.count -= 1),
        }
    }

    /// Reference count of the block at `head`.
    #[must_use]
    pub fn count(&self, head: PageFrameNumber) -> u32 {
        self.head_descriptor(head).count
    }

    #[must_use]
    pub fn is_free(&self, head: PageFrameNumber) -> bool {
        self.count(head) == 0
    }

    /// Order of the block at `head`.
    #[must_use]
    pub fn order_of(&self, head: PageFrameNumber) -> usize {
        self.head_descriptor(head).order()
    }

    pub fn set_slab(&mut self, frame: PageFrameNumber, slab: Option<VirtualAddress>) {
        self.descriptors.update(frame, |d| d.slab = encode_address(slab));
    }

    #[must_use]
    pub fn slab_of(&self, frame: PageFrameNumber) -> Option<VirtualAddress> {
        decode_address(self.descriptors.get(frame).slab)
    }

    pub fn set_mapping(&mut self, frame: PageFrameNumber, page: Option<VirtualPageNumber>) {
        self.descriptors
            .update(frame, |d| d.mapping = page.map_or(0, VirtualPageNumber::as_u32));
    }

    #[must_use]
    pub fn mapping_of(&self, frame: PageFrameNumber) -> Option<VirtualPageNumber> {
        match self.descriptors.get(frame).mapping {
            0 => None,
            vpn => Some(VirtualPageNumber::new(vpn)),
        }
    }

    /// Heads of the free blocks of `order`, in list order.
    #[must_use]
    pub fn free_blocks(&self, order: usize) -> Iter<Descriptors<M>> {
        self.free[order].iter(self.descriptors)
    }

    /// Heads of the used blocks of `order`, in list order.
    #[must_use]
    pub fn used_blocks(&self, order: usize) -> Iter<Descriptors<M>> {
        self.used[order].iter(self.descriptors)
    }

    #[must_use]
    pub fn stats(&self) -> PageStats {
        let mut stats = PageStats::default();
        for order in 0..self.order_count {
            let free = u32::try_from(self.free_blocks(order).count()).unwrap_or(u32::MAX);
            let used = u32::try_from(self.used_blocks(order).count()).unwrap_or(u32::MAX);
            stats.free_blocks[order] = free;
            stats.used_blocks[order] = used;
            stats.free_frames += free << order;
            stats.used_frames += used << order;
        }
        stats
    }

    /// Log the block counts of every order.
    pub fn dump(&self) {
        let stats = self.stats();
        debug!(
            "physical pages: {} free, {} used of {}",
            stats.free_frames,
            stats.used_frames,
            self.managed_frames()
        );
        for order in 0..self.order_count {
            debug!(
                "  order {order}: {} free, {} used",
                stats.free_blocks[order], stats.used_blocks[order]
            );
        }
    }
}

impl<M: Mmu + Copy> FrameAlloc for PhysicalPages<M> {
    fn alloc_4k(&mut self) -> Option<PageFrameNumber> {
        self.alloc_frame().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_vmem::testing::SimulatedMachine;

    /// Paging is off in a fresh machine, so the table address is physical.
    const TABLE: VirtualAddress = VirtualAddress::new(0x1000);

    fn universe(
        machine: &SimulatedMachine,
        first: u32,
        frames: u32,
        order_count: usize,
    ) -> PhysicalPages<&SimulatedMachine> {
        PhysicalPages::new(
            KernelMemory::new(machine),
            TABLE,
            PageFrameNumber::new(first),
            frames,
            order_count,
        )
    }

    fn sixteen_free(machine: &SimulatedMachine) -> PhysicalPages<&SimulatedMachine> {
        let mut pages = universe(machine, 0, 16, 5);
        pages.add_run(PageFrameNumber::new(0), PageFrameNumber::new(16), FrameStatus::Free);
        pages
    }

    fn frames(iter: impl Iterator<Item = PageFrameNumber>) -> Vec<u32> {
        iter.map(PageFrameNumber::as_u32).collect()
    }

    fn snapshot(pages: &PhysicalPages<&SimulatedMachine>) -> Vec<(Vec<u32>, Vec<u32>)> {
        (0..pages.order_count())
            .map(|o| (frames(pages.free_blocks(o)), frames(pages.used_blocks(o))))
            .collect()
    }

    #[test]
    fn fully_free_universe_is_one_top_block() {
        let machine = SimulatedMachine::new(64 * 1024);
        let pages = sixteen_free(&machine);
        assert_eq!(frames(pages.free_blocks(4)), [0]);
        assert_eq!(pages.stats().free_frames, 16);
        assert_eq!(pages.largest_block(), 16);
    }

    #[test]
    fn freeing_first_of_two_buddies_does_not_merge() {
        let machine = SimulatedMachine::new(64 * 1024);
        let mut pages = sixteen_free(&machine);

        let a = pages.alloc_block(2).expect("first");
        let b = pages.alloc_block(2).expect("second");
        assert_eq!((a.as_u32(), b.as_u32()), (0, 4));

        pages.free_block(a, 2);
        assert_eq!(frames(pages.free_blocks(2)), [0]);
        assert_eq!(frames(pages.used_blocks(2)), [4]);
        assert_eq!(frames(pages.free_blocks(3)), [8]);

        pages.free_block(b, 2);
        assert_eq!(frames(pages.free_blocks(4)), [0]);
        assert_eq!(pages.stats().free_blocks, [0, 0, 0, 0, 1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn free_of_alloc_restores_lists() {
        let machine = SimulatedMachine::new(64 * 1024);
        let mut pages = sixteen_free(&machine);
        // Some unrelated fragmentation first.
        let keep = pages.alloc_block(1).expect("keep");
        let _other = pages.alloc_block(0).expect("other");

        for order in 0..5 {
            let before = snapshot(&pages);
            match pages.alloc_block(order) {
                Ok(head) => {
                    pages.free_block(head, order);
                    assert_eq!(snapshot(&pages), before, "order {order}");
                }
                Err(e) => assert_eq!(e, AllocError::OutOfFrames),
            }
        }
        pages.free_block(keep, 1);
    }

    #[test]
    fn blocks_are_aligned_and_frames_conserved() {
        let machine = SimulatedMachine::new(64 * 1024);
        let mut pages = universe(&machine, 0, 64, 7);
        pages.add_run(PageFrameNumber::new(0), PageFrameNumber::new(64), FrameStatus::Free);

        let mut live = Vec::new();
        for order in [0, 3, 1, 2, 0, 4, 1, 0] {
            let head = pages.alloc_block(order).expect("alloc");
            let aligned = head.is_aligned_to_order(u32::try_from(order).unwrap());
            assert!(aligned, "{head} order {order}");
            live.push((head, order));
            let stats = pages.stats();
            assert_eq!(stats.free_frames + stats.used_frames, 64);
        }
        for (head, order) in live.drain(..).rev().step_by(2) {
            pages.free_block(head, order);
            let stats = pages.stats();
            assert_eq!(stats.free_frames + stats.used_frames, 64);
        }
    }

    #[test]
    fn runs_are_cut_at_largest_aligned_order() {
        let machine = SimulatedMachine::new(64 * 1024);
        let mut pages = universe(&machine, 0, 16, 5);
        pages.add_run(PageFrameNumber::new(0), PageFrameNumber::new(3), FrameStatus::Used);
        pages.add_run(PageFrameNumber::new(3), PageFrameNumber::new(16), FrameStatus::Free);

        assert_eq!(frames(pages.used_blocks(1)), [0]);
        assert_eq!(frames(pages.used_blocks(0)), [2]);
        assert_eq!(frames(pages.free_blocks(0)), [3]);
        assert_eq!(frames(pages.free_blocks(2)), [4]);
        assert_eq!(frames(pages.free_blocks(3)), [8]);
        assert_eq!(pages.stats().used_frames, 3);
        assert_eq!(pages.count(PageFrameNumber::new(0)), 1);
        assert!(pages.is_free(PageFrameNumber::new(4)));
    }

    #[test]
    fn merging_stops_at_managed_range() {
        let machine = SimulatedMachine::new(64 * 1024);
        // 0x104..0x10C: the order-3 buddy of 0x108 (0x100) is not managed.
        let mut pages = universe(&machine, 0x104, 8, 5);
        pages.add_run(PageFrameNumber::new(0x104), PageFrameNumber::new(0x10C), FrameStatus::Free);
        assert_eq!(frames(pages.free_blocks(2)), [0x104, 0x108]);

        let a = pages.alloc_block(2).expect("a");
        pages.free_block(a, 2);
        assert_eq!(frames(pages.free_blocks(2)), [0x104, 0x108]);
        assert_eq!(pages.free_blocks(3).count(), 0);
    }

    #[test]
    fn alloc_n_rounds_up_to_a_block() {
        let machine = SimulatedMachine::new(64 * 1024);
        let mut pages = sixteen_free(&machine);
        let head = pages.alloc_n(3).expect("three");
        assert_eq!(pages.order_of(head), 2);
        let one = pages.alloc_n(1).expect("one");
        assert_eq!(pages.order_of(one), 0);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let machine = SimulatedMachine::new(64 * 1024);
        let mut pages = sixteen_free(&machine);
        let all = pages.alloc_block(4).expect("everything");
        assert_eq!(pages.alloc_frame(), Err(AllocError::OutOfFrames));
        assert_eq!(pages.alloc_4k(), None);
        pages.free_block(all, 4);
        assert!(pages.alloc_frame().is_ok());
    }

    #[test]
    fn last_unref_frees_block() {
        let machine = SimulatedMachine::new(64 * 1024);
        let mut pages = sixteen_free(&machine);
        let head = pages.alloc_block(1).expect("alloc");

        pages.ref_frame(head);
        assert_eq!(pages.count(head), 2);
        pages.unref_frame(head);
        assert_eq!(pages.count(head), 1);
        pages.unref_frame(head);
        assert!(pages.is_free(PageFrameNumber::new(0)));
        assert_eq!(frames(pages.free_blocks(4)), [0]);
    }

    #[test]
    fn back_links_round_trip() {
        let machine = SimulatedMachine::new(64 * 1024);
        let mut pages = sixteen_free(&machine);
        let frame = pages.alloc_frame().expect("alloc");

        pages.set_slab(frame, Some(VirtualAddress::new(0xC011_6018)));
        pages.set_mapping(frame, Some(VirtualPageNumber::new(0xC0116)));
        assert_eq!(pages.slab_of(frame), Some(VirtualAddress::new(0xC011_6018)));
        assert_eq!(pages.mapping_of(frame), Some(VirtualPageNumber::new(0xC0116)));

        pages.set_slab(frame, None);
        pages.set_mapping(frame, None);
        pages.free_frame(frame);
    }

    #[test]
    #[should_panic(expected = "unreferencing free block")]
    fn unref_of_free_block_panics() {
        let machine = SimulatedMachine::new(64 * 1024);
        let mut pages = sixteen_free(&machine);
        pages.unref_frame(PageFrameNumber::new(0));
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let machine = SimulatedMachine::new(64 * 1024);
        let mut pages = sixteen_free(&machine);
        let head = pages.alloc_block(2).expect("alloc");
        let _keep = pages.alloc_block(2).expect("buddy stays used");
        pages.free_block(head, 2);
        pages.free_block(head, 2);
    }

    #[test]
    #[should_panic(expected = "not 1")]
    fn free_with_wrong_order_panics() {
        let machine = SimulatedMachine::new(64 * 1024);
        let mut pages = sixteen_free(&machine);
        let head = pages.alloc_block(2).expect("alloc");
        pages.free_block(head, 1);
    }

    #[test]
    #[should_panic(expected = "slab or a mapping")]
    fn free_of_slab_frame_panics() {
        let machine = SimulatedMachine::new(64 * 1024);
        let mut pages = sixteen_free(&machine);
        let frame = pages.alloc_frame().expect("alloc");
        pages.set_slab(frame, Some(VirtualAddress::new(0xC000_1000)));
        pages.free_frame(frame);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn order_beyond_max_panics() {
        let machine = SimulatedMachine::new(64 * 1024);
        let mut pages = sixteen_free(&machine);
        let _ = pages.alloc_block(5);
    }

    #[test]
    #[should_panic(expected = "exceed the largest block")]
    fn alloc_n_beyond_largest_block_panics() {
        let machine = SimulatedMachine::new(64 * 1024);
        let mut pages = sixteen_free(&machine);
        let _ = pages.alloc_n(17);
    }
}
