use bitfield_struct::bitfield;

/// Architectural model of CR0 in 32-bit protected mode.
///
/// Exposes the architecturally defined control bits as booleans
/// and keeps all reserved bits forced to 0.
#[bitfield(u32)]
pub struct Cr0 {
    /// Bit 0 — Protection Enable (PE).
    ///
    /// - 0: Real mode (no paging, no protection).
    /// - 1: Protected mode (required for paging).
    pub pe_protection_enable: bool,

    /// Bit 1 — Monitor Coprocessor (MP).
    pub mp_monitor_coprocessor: bool,

    /// Bit 2 — Emulation (EM).
    ///
    /// - 1: No x87 present; all x87 instructions fault.
    pub em_emulation: bool,

    /// Bit 3 — Task Switched (TS).
    pub ts_task_switched: bool,

    /// Bit 4 — Extension Type (ET).
    pub et_extension_type: bool,

    /// Bit 5 — Numeric Error (NE).
    pub ne_numeric_error: bool,

    /// Bits 6–15 — Reserved (must be 0).
    #[bits(10, default = 0)]
    _reserved_6_15: u16,

    /// Bit 16 — Write Protect (WP).
    ///
    /// When set, supervisor code must respect read-only pages.
    pub wp_write_protect: bool,

    /// Bit 17 — Reserved (must be 0).
    #[bits(default = 0)]
    _reserved_17: bool,

    /// Bit 18 — Alignment Mask (AM).
    pub am_alignment_mask: bool,

    /// Bits 19–28 — Reserved (must be 0).
    #[bits(10, default = 0)]
    _reserved_19_28: u16,

    /// Bit 29 — Not-Write-Through (NW).
    pub nw_not_write_through: bool,

    /// Bit 30 — Cache Disable (CD).
    pub cd_cache_disable: bool,

    /// Bit 31 — Paging (PG).
    ///
    /// - 0: Paging disabled.
    /// - 1: Paging enabled (requires PE=1 and a valid CR3).
    pub pg_paging: bool,
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl crate::LoadRegisterUnsafe for Cr0 {
    unsafe fn load_unsafe() -> Self {
        let mut cr0: u32;
        unsafe {
            core::arch::asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr0)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl crate::StoreRegisterUnsafe for Cr0 {
    unsafe fn store_unsafe(self) {
        let cr0 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr0, {}", in(reg) cr0, options(nostack, preserves_flags));
        }
    }
}
