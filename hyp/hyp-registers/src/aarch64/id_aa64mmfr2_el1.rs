use bitfield_struct::bitfield;

/// `ID_AA64MMFR2_EL1` — AArch64 Memory Model Feature Register 2.
///
/// Only [`ccidx`](Self::ccidx) matters for cache probing; the remaining fields
/// are decoded for completeness.
#[bitfield(u64)]
#[derive(Eq, PartialEq)]
pub struct IdAa64Mmfr2El1 {
    /// Bits 0–3 — CnP: Common not Private translations.
    #[bits(4)]
    pub cnp: u8,
    /// Bits 4–7 — UAO: User Access Override.
    #[bits(4)]
    pub uao: u8,
    /// Bits 8–11 — LSM: Load/Store Multiple atomicity and ordering.
    #[bits(4)]
    pub lsm: u8,
    /// Bits 12–15 — IESB: Implicit Error Synchronization event.
    #[bits(4)]
    pub iesb: u8,
    /// Bits 16–19 — VARange: 52-bit virtual addresses.
    #[bits(4)]
    pub varange: u8,
    /// Bits 20–23 — CCIDX: 64-bit format of `CCSIDR_EL1`.
    #[bits(4)]
    pub ccidx: u8,
    /// Bits 24–27 — NV: Nested virtualization.
    #[bits(4)]
    pub nv: u8,
    /// Bits 28–31 — ST: Small translation tables.
    #[bits(4)]
    pub st: u8,
    /// Bits 32–35 — AT: Unaligned single-copy atomicity.
    #[bits(4)]
    pub at: u8,
    /// Bits 36–39 — IDS: ID register trap syndrome.
    #[bits(4)]
    pub ids: u8,
    /// Bits 40–43 — FWB: Stage 2 forced write-back.
    #[bits(4)]
    pub fwb: u8,
    /// Bits 44–47 — Reserved.
    #[bits(4)]
    _res44: u8,
    /// Bits 48–51 — TTL: TTL field in address operations.
    #[bits(4)]
    pub ttl: u8,
    /// Bits 52–55 — BBM: Break-before-make levels.
    #[bits(4)]
    pub bbm: u8,
    /// Bits 56–59 — EVT: Enhanced virtualization traps.
    #[bits(4)]
    pub evt: u8,
    /// Bits 60–63 — E0PD.
    #[bits(4)]
    pub e0pd: u8,
}

impl IdAa64Mmfr2El1 {
    /// Whether `CCSIDR_EL1` uses the `FEAT_CCIDX` layout.
    #[must_use]
    pub const fn has_ccidx(&self) -> bool {
        self.ccidx() & 0x7 != 0
    }
}

#[cfg(all(feature = "asm", target_arch = "aarch64"))]
impl crate::LoadRegisterUnsafe for IdAa64Mmfr2El1 {
    #[inline]
    unsafe fn load_unsafe() -> Self {
        let raw: u64;
        unsafe {
            core::arch::asm!("mrs {}, id_aa64mmfr2_el1", out(reg) raw, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ccidx_field() {
        assert!(!IdAa64Mmfr2El1::new().has_ccidx());
        assert!(IdAa64Mmfr2El1::from_bits(1 << 20).has_ccidx());
        assert!(IdAa64Mmfr2El1::new().with_ccidx(1).has_ccidx());
    }
}
