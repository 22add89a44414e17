use bitfield_struct::bitfield;

/// `CSSELR_EL1` — Cache Size Selection Register.
///
/// Selects the cache level and side that `CCSIDR_EL1` reports on.
#[bitfield(u64)]
#[derive(Eq, PartialEq)]
pub struct CsselrEl1 {
    /// Bit 0 — InD: `1` selects the instruction cache, `0` the data or unified cache.
    pub ind: bool,

    /// Bits 1–3 — Level: cache level minus one (`0` selects L1).
    #[bits(3)]
    pub level: u8,

    /// Bit 4 — TnD: selects the separate allocation tag cache (`FEAT_MTE2`).
    pub tnd: bool,

    /// Bits 5–63 — Reserved.
    #[bits(59)]
    _res5: u64,
}

impl CsselrEl1 {
    /// Selects the data or unified side of `level` (1-based).
    #[must_use]
    pub const fn data_level(level: u8) -> Self {
        debug_assert!(level >= 1);
        Self::new().with_level(level - 1)
    }
}

#[cfg(all(feature = "asm", target_arch = "aarch64"))]
impl crate::LoadRegisterUnsafe for CsselrEl1 {
    #[inline]
    unsafe fn load_unsafe() -> Self {
        let raw: u64;
        unsafe {
            core::arch::asm!("mrs {}, csselr_el1", out(reg) raw, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(raw)
    }
}

#[cfg(all(feature = "asm", target_arch = "aarch64"))]
impl crate::StoreRegisterUnsafe for CsselrEl1 {
    #[inline]
    unsafe fn store_unsafe(self) {
        let raw = self.into_bits();
        unsafe {
            core::arch::asm!("msr csselr_el1, {}", in(reg) raw, options(nomem, nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_encoded_minus_one() {
        let sel = CsselrEl1::data_level(3);
        assert_eq!(sel.into_bits(), 0b100);
        assert!(!sel.ind());
        assert_eq!(CsselrEl1::data_level(1).into_bits(), 0);
    }
}
