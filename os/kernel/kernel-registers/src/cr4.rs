use bitfield_struct::bitfield;

/// CR4 — the subset of control bits relevant to a 32-bit kernel without PAE.
#[bitfield(u32)]
pub struct Cr4 {
    /// Bit 0 — Virtual-8086 Mode Extensions.
    pub vme: bool,
    /// Bit 1 — Protected-Mode Virtual Interrupts.
    pub pvi: bool,
    /// Bit 2 — Time Stamp Disable (RDTSC privileged).
    pub tsd: bool,
    /// Bit 3 — Debugging Extensions.
    pub de: bool,
    /// Bit 4 — Page Size Extensions.
    ///
    /// Allows directory entries with `PS=1` to map 4 MiB pages.
    pub pse: bool,
    /// Bit 5 — Physical Address Extension (unused here, must stay 0).
    pub pae: bool,
    /// Bit 6 — Machine-Check Enable.
    pub mce: bool,
    /// Bit 7 — Page Global Enable.
    ///
    /// Honors the global bit of leaf entries; such translations survive CR3 reloads.
    pub pge: bool,
    /// Bit 8 — Performance-Monitoring Counter Enable.
    pub pce: bool,
    /// Bits 9–31 — not modelled, preserved as-is.
    #[bits(23)]
    pub upper: u32,
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl crate::LoadRegisterUnsafe for Cr4 {
    unsafe fn load_unsafe() -> Self {
        let mut cr4: u32;
        unsafe {
            core::arch::asm!("mov {}, cr4", out(reg) cr4, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr4)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl crate::StoreRegisterUnsafe for Cr4 {
    unsafe fn store_unsafe(self) {
        let cr4 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr4, {}", in(reg) cr4, options(nostack, preserves_flags));
        }
    }
}
