//! # Kernel Memory Allocation
//!
//! Everything the kernel uses to hand out memory, layered bottom-up:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │        MMU contexts ([`mmu_context`])               │
//! │    • one page directory per address space           │
//! │    • kernel half shared, user half private          │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │        Object caches ([`slab`])                     │
//! │    • fixed-size objects carved from slabs           │
//! │    • their own records are cache objects too        │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │        Kernel virtual regions ([`vregion`])         │
//! │    • first-fit, coalescing free list                │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │        Physical pages ([`buddy`])                   │
//! │    • power-of-two blocks, one descriptor per frame  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! [`MemoryManager`] owns all of them. [`MemoryManager::boot`] turns paging
//! on, builds the descriptor table with bump allocators ([`frame_alloc`]) and
//! wires up the three seed caches; the manager then lives in a
//! [`GlobalMemory`].
//!
//! Every record (descriptors, regions, slabs, caches, contexts) lives in
//! kernel memory and is reached through [`KernelMemory`], so the same code
//! runs on hardware and on the simulated machine of the tests.
//!
//! ## Usage
//! ```ignore
//! let mut mm = unsafe { MemoryManager::boot(mmu, &HigherHalfMapper, &info) };
//! mm.mmu_init()?;
//!
//! let tasks = mm.objs_cache_create("Task", 64, 1)?;
//! let task = mm.objs_cache_alloc(tasks)?;
//! mm.objs_cache_free(tasks, task);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod bootstrap;
pub mod buddy;
mod error;
pub mod frame_alloc;
mod global;
pub mod list;
mod manager;
pub mod memory;
pub mod mmu_context;
pub mod phys_mapper;
pub mod slab;
pub mod vregion;

pub use crate::buddy::{FrameStatus, MAX_BLOCK_ORDER, PageStats, PhysicalPages};
pub use crate::error::AllocError;
pub use crate::global::GlobalMemory;
pub use crate::manager::MemoryManager;
pub use crate::memory::KernelMemory;
pub use crate::mmu_context::{ContextId, MmuContext};
pub use crate::slab::{CacheId, CacheRecord, MIN_FREE};
pub use crate::vregion::{Region, RegionId};
