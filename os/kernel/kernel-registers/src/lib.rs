//! # Typed i386 Control Registers
//!
//! `CR0`, `CR3` and `CR4` modelled as [`bitfield_struct`] values. Reading and
//! writing the hardware registers requires the `asm` feature and a 32-bit x86
//! target; on other targets only the bit layouts are available (which is what
//! host-side tests use).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr0")]
pub mod cr0;

#[cfg(feature = "cr3")]
pub mod cr3;

#[cfg(feature = "cr4")]
pub mod cr4;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn store_unsafe(self);
}
