//! # Kernel Configuration and Boot Interface
//!
//! Memory layout constants of the 32-bit kernel and the information the boot
//! stub passes to memory management.
//!
//! ## Architecture
//!
//! ### Boot Information ([`boot`])
//! * **Physical extent**: last usable frame of RAM
//! * **Kernel image**: physical start/end of the loaded image
//! * **Kernel heap**: last virtual page the region allocator may hand out
//!
//! ### Memory Layout ([`memory`])
//! * **Higher half**: the kernel lives at [`KERNEL_SPACE`](memory::KERNEL_SPACE)
//!   and above in every address space
//! * **Recursive self-map**: directory entry
//!   [`RECURSIVE_ENTRY`](memory::RECURSIVE_ENTRY) points at the directory,
//!   making all paging structures reachable through ordinary loads and stores
//! * **Reserved low memory**: the first MiB is never handed out
//!
//! ## Physical Memory Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │     Low Memory (< 1MiB)         │
//!             │  (BIOS, VGA, DMA buffers)       │
//! PHYS_LOAD   ├─────────────────────────────────┤ 0x0010_0000 (1 MiB)
//!             │       Kernel Image              │
//!             ├─────────────────────────────────┤
//!             │  Boot-allocated frames          │
//!             │  (page tables, descriptors)     │
//!             ├─────────────────────────────────┤
//!             │    Available RAM                │
//!             │  (Managed by the buddy system)  │
//!             └─────────────────────────────────┘
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
