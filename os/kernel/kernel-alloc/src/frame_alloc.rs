//! Bump allocators for the boot phase.
//!
//! Before the buddy system has its descriptor table, physical frames and
//! kernel virtual pages are handed out linearly from the memory right behind
//! the kernel image. Nothing is ever given back: the buddy allocator later
//! marks everything consumed here as used.

use kernel_memory_addresses::{PageFrameNumber, VirtualPageNumber};
use kernel_vmem::FrameAlloc;

/// Hands out consecutive physical frames of `[first, last]`.
#[derive(Debug, Clone)]
pub struct BootFrameAlloc {
    first: PageFrameNumber,
    next: PageFrameNumber,
    last: PageFrameNumber,
}

impl BootFrameAlloc {
    #[must_use]
    pub const fn new(first: PageFrameNumber, last: PageFrameNumber) -> Self {
        Self {
            first,
            next: first,
            last,
        }
    }

    /// Next frame, `None` once the range is used up.
    pub fn alloc(&mut self) -> Option<PageFrameNumber> {
        if self.next > self.last {
            return None;
        }
        let frame = self.next;
        self.next += 1;
        Some(frame)
    }

    /// First frame of the range.
    #[must_use]
    pub const fn first(&self) -> PageFrameNumber {
        self.first
    }

    /// First frame not handed out yet.
    #[must_use]
    pub const fn next_free(&self) -> PageFrameNumber {
        self.next
    }

    /// Number of frames handed out so far.
    #[must_use]
    pub fn consumed(&self) -> u32 {
        self.next - self.first
    }
}

impl FrameAlloc for BootFrameAlloc {
    fn alloc_4k(&mut self) -> Option<PageFrameNumber> {
        self.alloc()
    }
}

/// Hands out consecutive kernel virtual pages of `[first, last]`.
#[derive(Debug, Clone)]
pub struct BootPageAlloc {
    next: VirtualPageNumber,
    last: VirtualPageNumber,
}

impl BootPageAlloc {
    #[must_use]
    pub const fn new(first: VirtualPageNumber, last: VirtualPageNumber) -> Self {
        Self { next: first, last }
    }

    pub fn alloc(&mut self) -> Option<VirtualPageNumber> {
        if self.next > self.last {
            return None;
        }
        let page = self.next;
        self.next += 1;
        Some(page)
    }

    /// First page not handed out yet.
    #[must_use]
    pub const fn next_free(&self) -> VirtualPageNumber {
        self.next
    }

    /// Last page of the range (inclusive).
    #[must_use]
    pub const fn last(&self) -> VirtualPageNumber {
        self.last
    }

    /// Pages left, `0` once exhausted.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        if self.next > self.last {
            0
        } else {
            self.last - self.next + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_consecutive_until_exhausted() {
        let mut frames =
            BootFrameAlloc::new(PageFrameNumber::new(0x110), PageFrameNumber::new(0x112));
        assert_eq!(frames.alloc(), Some(PageFrameNumber::new(0x110)));
        assert_eq!(frames.alloc_4k(), Some(PageFrameNumber::new(0x111)));
        assert_eq!(frames.alloc(), Some(PageFrameNumber::new(0x112)));
        assert_eq!(frames.alloc(), None);
        assert_eq!(frames.consumed(), 3);
        assert_eq!(frames.next_free(), PageFrameNumber::new(0x113));
    }

    #[test]
    fn pages_report_what_is_left() {
        let mut pages =
            BootPageAlloc::new(VirtualPageNumber::new(0xC0110), VirtualPageNumber::new(0xC0111));
        assert_eq!(pages.remaining(), 2);
        assert_eq!(pages.alloc(), Some(VirtualPageNumber::new(0xC0110)));
        assert_eq!(pages.alloc(), Some(VirtualPageNumber::new(0xC0111)));
        assert_eq!(pages.remaining(), 0);
        assert_eq!(pages.alloc(), None);
    }
}
