use bitfield_struct::bitfield;

/// `CCSIDR_EL1` — Current Cache Size ID Register, layout without `FEAT_CCIDX`.
#[bitfield(u64)]
#[derive(Eq, PartialEq)]
pub struct CcsidrEl1 {
    /// Bits 0–2 — LineSize: log2(bytes per line) minus 4.
    #[bits(3)]
    pub line_size: u8,

    /// Bits 3–12 — Associativity: number of ways minus one.
    #[bits(10)]
    pub associativity: u16,

    /// Bits 13–27 — NumSets: number of sets minus one.
    #[bits(15)]
    pub num_sets: u32,

    /// Bits 28–31 — formerly WT/WB/RA/WA, now reserved.
    #[bits(4)]
    _res28: u8,

    /// Bits 32–63 — Reserved.
    #[bits(32)]
    _res32: u32,
}

/// `CCSIDR_EL1` — Current Cache Size ID Register, `FEAT_CCIDX` layout.
#[bitfield(u64)]
#[derive(Eq, PartialEq)]
pub struct CcsidrEl1Ccidx {
    /// Bits 0–2 — LineSize: log2(bytes per line) minus 4.
    #[bits(3)]
    pub line_size: u8,

    /// Bits 3–23 — Associativity: number of ways minus one.
    #[bits(21)]
    pub associativity: u32,

    /// Bits 24–31 — Reserved.
    #[bits(8)]
    _res24: u8,

    /// Bits 32–55 — NumSets: number of sets minus one.
    #[bits(24)]
    pub num_sets: u32,

    /// Bits 56–63 — Reserved.
    #[bits(8)]
    _res56: u8,
}

/// Decoded geometry of one cache level.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CacheSizeId {
    /// Bytes per cache line.
    pub line_size: u32,
    /// Number of ways.
    pub ways: u32,
    /// Number of sets.
    pub sets: u32,
}

impl CacheSizeId {
    /// Decode a raw `CCSIDR_EL1` value using the layout selected by `ccidx`.
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn decode(raw: u64, ccidx: bool) -> Self {
        let (line_size, ways, sets) = if ccidx {
            let r = CcsidrEl1Ccidx::from_bits(raw);
            (r.line_size(), r.associativity() + 1, r.num_sets() + 1)
        } else {
            let r = CcsidrEl1::from_bits(raw);
            (r.line_size(), r.associativity() as u32 + 1, r.num_sets() + 1)
        };
        Self {
            line_size: 1 << (line_size + 4),
            ways,
            sets,
        }
    }

    /// Total capacity in bytes.
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn size(&self) -> u64 {
        self.line_size as u64 * self.ways as u64 * self.sets as u64
    }
}

#[cfg(all(feature = "asm", target_arch = "aarch64"))]
impl crate::LoadRegisterUnsafe for CcsidrEl1 {
    #[inline]
    unsafe fn load_unsafe() -> Self {
        let raw: u64;
        unsafe {
            core::arch::asm!("mrs {}, ccsidr_el1", out(reg) raw, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_legacy_layout() {
        // 1 MiB, 16-way, 64-byte lines: 1024 sets.
        let raw = CcsidrEl1::new()
            .with_line_size(2)
            .with_associativity(15)
            .with_num_sets(1023)
            .into_bits();
        let id = CacheSizeId::decode(raw, false);
        assert_eq!(id.line_size, 64);
        assert_eq!(id.ways, 16);
        assert_eq!(id.sets, 1024);
        assert_eq!(id.size(), 1024 * 1024);
    }

    #[test]
    fn decodes_ccidx_layout() {
        let raw = CcsidrEl1Ccidx::new()
            .with_line_size(2)
            .with_associativity(11)
            .with_num_sets(0x1_0000 - 1)
            .into_bits();
        let id = CacheSizeId::decode(raw, true);
        assert_eq!(id.line_size, 64);
        assert_eq!(id.ways, 12);
        assert_eq!(id.sets, 0x1_0000);
        // Reading the same bits with the legacy layout gives a different answer.
        assert_ne!(CacheSizeId::decode(raw, false), id);
    }
}
