use core::fmt::{self, Write};

/// Destination for debug bytes.
pub trait ByteSink: Send + Sync {
    fn put(&self, byte: u8);
}

/// An emulator debug-console I/O port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugPort {
    port: u16,
}

impl DebugPort {
    /// QEMU's `isa-debugcon` default port.
    pub const QEMU: Self = Self::new(0x402);

    /// The Bochs `0xE9` hack port (also understood by QEMU with `-debugcon`).
    pub const BOCHS: Self = Self::new(0xE9);

    #[must_use]
    pub const fn new(port: u16) -> Self {
        Self { port }
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl ByteSink for DebugPort {
    #[inline]
    fn put(&self, byte: u8) {
        #[cfg(all(feature = "enabled", any(target_arch = "x86", target_arch = "x86_64")))]
        unsafe {
            outb(self.port, byte);
        }
        #[cfg(not(all(feature = "enabled", any(target_arch = "x86", target_arch = "x86_64"))))]
        let _ = byte;
    }
}

#[cfg(all(feature = "enabled", any(target_arch = "x86", target_arch = "x86_64")))]
#[allow(clippy::inline_always)]
#[inline(always)]
unsafe fn outb(port: u16, val: u8) {
    unsafe {
        core::arch::asm!(
            "out dx, al",
            in("dx") port,
            in("al") val,
            options(nomem, nostack, preserves_flags)
        );
    }
}

/// `core::fmt::Write` adapter over a [`ByteSink`].
pub struct SinkWriter<'a, S: ?Sized> {
    sink: &'a S,
}

impl<'a, S: ByteSink + ?Sized> SinkWriter<'a, S> {
    #[must_use]
    pub const fn new(sink: &'a S) -> Self {
        Self { sink }
    }
}

impl<S: ByteSink + ?Sized> Write for SinkWriter<'_, S> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            self.sink.put(b);
        }
        Ok(())
    }
}
