//! # Kernel synchronization primitives
//!
//! The memory manager runs on a single CPU without preemption, but its state
//! still sits behind a [`SpinLock`] so that interrupt handlers or a future SMP
//! bring-up cannot observe half-updated allocator lists.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;

pub use spin_lock::{SpinLock, SpinLockGuard};
