//! # QEMU Debug Console Support
//!
//! Logging for a kernel running under QEMU (or Bochs) before any other output
//! device exists. Everything is written byte by byte to the emulator's debug
//! console port and shows up on the host with `-debugcon stdio`.
//!
//! ## Components
//!
//! * [`ByteSink`]: where bytes go. [`DebugPort`] writes to an I/O port; tests
//!   plug in a capturing sink.
//! * [`QemuLogger`]: a `log::Log` implementation formatting records as
//!   `[LEVEL] target: message` lines into a sink. This is the logger behind
//!   all `log::info!` / `log::debug!` output of the memory manager.
//!
//! ## Feature System
//!
//! With the default `enabled` feature the port writes are compiled in. Without
//! it [`DebugPort`] discards everything, so release images carry no port I/O.
//!
//! ## Usage
//! ```rust,no_run
//! use kernel_qemu::QemuLogger;
//! use log::{LevelFilter, info};
//!
//! static LOGGER: QemuLogger = QemuLogger::new(LevelFilter::Debug);
//!
//! LOGGER.init().expect("logger initialization");
//! info!("memory manager up");
//! ```
//!
//! ```bash
//! qemu-system-i386 -kernel kernel.elf -debugcon stdio
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;
mod sink;

pub use logger::QemuLogger;
pub use sink::{ByteSink, DebugPort, SinkWriter};
