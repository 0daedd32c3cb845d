//! # MMU contexts
//!
//! An MMU context is one page directory: its own user half (directory
//! entries `0..768`) and the kernel half shared with everyone else. While a
//! context is not loaded its directory is edited through a one-page kernel
//! window; once loaded, through the recursive entry like any other.
//!
//! Loading copies the kernel half from the active directory first, so kernel
//! page tables created in the meantime are picked up.

use crate::error::AllocError;
use crate::manager::{MemoryManager, slab_flags};
use crate::memory::Record;
use crate::slab::CacheId;
use crate::vregion::RegionId;
use core::fmt;
use kernel_info::memory::{KERNEL_DIRECTORY_INDEX, RECURSIVE_ENTRY};
use kernel_memory_addresses::{PageFrameNumber, VirtualAddress};
use kernel_vmem::{DirectoryEntry, DirectoryEntryKind, Mmu, PageEntryBits};
use log::{debug, trace};

/// Size of a context record.
pub const MMU_CONTEXT_SIZE: u32 = 12;

/// Pages per slab of the context cache.
const CONTEXT_PAGES_PER_SLAB: u32 = 2;

/// Bytes per directory entry.
const ENTRY_SIZE: u32 = 4;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MmuContext {
    directory: u32,
    window: u32,
    region: u32,
}

unsafe impl Record for MmuContext {}

const _: () = assert!(size_of::<MmuContext>() == MMU_CONTEXT_SIZE as usize);

impl MmuContext {
    /// Frame holding the directory.
    #[must_use]
    pub const fn directory(&self) -> PageFrameNumber {
        PageFrameNumber::new(self.directory)
    }

    /// Kernel address the directory is mapped at.
    #[must_use]
    pub const fn window(&self) -> VirtualAddress {
        VirtualAddress::new(self.window)
    }

    #[allow(clippy::cast_possible_truncation)] // index < 1024
    const fn entry_address(&self, index: usize) -> VirtualAddress {
        VirtualAddress::new(self.window + index as u32 * ENTRY_SIZE)
    }
}

/// Handle of an MMU context: the address of its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(VirtualAddress);

impl ContextId {
    #[must_use]
    pub const fn address(self) -> VirtualAddress {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context@{}", self.0)
    }
}

impl<M: Mmu + Copy> MemoryManager<M> {
    /// Create the cache of context records.
    ///
    /// # Errors
    /// If the cache record cannot be allocated.
    ///
    /// # Panics
    /// If called twice.
    pub fn mmu_init(&mut self) -> Result<(), AllocError> {
        assert!(self.contexts.is_none(), "MMU contexts are already initialised");
        self.contexts = Some(self.objs_cache_create(
            "Mmu_context",
            MMU_CONTEXT_SIZE,
            CONTEXT_PAGES_PER_SLAB,
        )?);
        Ok(())
    }

    fn context_cache(&self) -> CacheId {
        let Some(cache) = self.contexts else {
            panic!("MMU contexts used before mmu_init");
        };
        cache
    }

    #[must_use]
    pub fn context(&self, context: ContextId) -> MmuContext {
        self.memory.read(context.0)
    }

    /// The loaded context; `None` while the boot directory is active.
    #[must_use]
    pub const fn active_context(&self) -> Option<ContextId> {
        self.active
    }

    /// A new address space with an empty user half.
    ///
    /// # Errors
    /// Exhaustion of frames, virtual space or page tables; nothing is leaked.
    pub fn context_create(&mut self) -> Result<ContextId, AllocError> {
        let cache = self.context_cache();
        let record = self.objs_cache_alloc(cache)?;

        let directory = match self.pages.alloc_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.objs_cache_free(cache, record);
                return Err(e);
            }
        };

        let region = match self.region_alloc(1) {
            Ok(region) => region,
            Err(e) => {
                self.pages.free_frame(directory);
                self.objs_cache_free(cache, record);
                return Err(e);
            }
        };

        let page = self.regions.record(region).first_page();
        if let Err(e) = self.map(directory, page, slab_flags()) {
            self.region_free(region);
            self.pages.free_frame(directory);
            self.objs_cache_free(cache, record);
            return Err(e);
        }
        self.pages.set_mapping(directory, Some(page));
        self.memory.zero_page(page);

        self.memory.write(
            record,
            MmuContext {
                directory: directory.as_u32(),
                window: page.base().as_u32(),
                region: region.address().as_u32(),
            },
        );
        debug!("MMU context {record}: directory {directory}, window {page}");
        Ok(ContextId(record))
    }

    /// Switch to `context`.
    pub fn context_load(&mut self, context: ContextId) {
        let c = self.context(context);
        for index in KERNEL_DIRECTORY_INDEX..RECURSIVE_ENTRY {
            let entry = self.paging.directory_entry(index);
            self.memory.write(c.entry_address(index), entry.into_bits());
        }
        let own = DirectoryEntry::table(c.directory(), PageEntryBits::new_kernel_rw());
        self.memory
            .write(c.entry_address(RECURSIVE_ENTRY), own.into_bits());

        // SAFETY: the kernel half was just copied from the active directory,
        // so the running code and all kernel data stay mapped.
        unsafe { self.memory.mmu().load_directory(c.directory().base()) };
        self.active = Some(context);
        trace!("loaded {context}");
    }

    /// Switch back to the boot directory, carrying over kernel page tables
    /// created while the context was loaded.
    pub fn load_kernel_context(&mut self) {
        if self.active.take().is_none() {
            return;
        }

        let kernel: [u32; RECURSIVE_ENTRY - KERNEL_DIRECTORY_INDEX] = core::array::from_fn(|i| {
            self.paging
                .directory_entry(KERNEL_DIRECTORY_INDEX + i)
                .into_bits()
        });

        // SAFETY: the boot directory maps the whole kernel half.
        unsafe {
            self.memory
                .mmu()
                .load_directory(self.kernel_directory.base());
        }
        for (i, bits) in kernel.into_iter().enumerate() {
            self.paging
                .set_directory_entry(KERNEL_DIRECTORY_INDEX + i, DirectoryEntry::from_bits(bits));
        }
        trace!("loaded kernel context");
    }

    /// Release `context`: its user page tables, window, directory and record.
    ///
    /// Frames mapped by the user half are not touched.
    ///
    /// # Panics
    /// If `context` is loaded.
    pub fn context_destroy(&mut self, context: ContextId) {
        assert_ne!(self.active, Some(context), "destroying the loaded {context}");
        let c = self.context(context);

        for index in 0..KERNEL_DIRECTORY_INDEX {
            let entry = DirectoryEntry::from_bits(self.memory.read(c.entry_address(index)));
            if let Some(DirectoryEntryKind::Table(table)) = entry.kind() {
                self.pages.free_frame(table);
            }
        }

        let Some(directory) = self.paging.unmap(c.window().page()) else {
            panic!("window of {context} is not mapped");
        };
        assert_eq!(directory, c.directory(), "window of {context} maps a foreign frame");
        self.pages.set_mapping(directory, None);
        self.pages.free_frame(directory);

        self.region_free(RegionId::from_address(VirtualAddress::new(c.region)));
        let cache = self.context_cache();
        self.objs_cache_free(cache, context.0);
        debug!("MMU context {context} destroyed");
    }
}
