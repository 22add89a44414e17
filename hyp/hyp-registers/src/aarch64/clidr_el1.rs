use bitfield_struct::bitfield;

/// Number of cache levels `CLIDR_EL1` can describe.
pub const CLIDR_MAX_LEVELS: u8 = 7;

/// `CLIDR_EL1.Ctype<n>` — what a cache level holds.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum CacheType {
    /// `0b000` — no cache at this level.
    None = 0b000,
    /// `0b001` — instruction cache only.
    InstructionOnly = 0b001,
    /// `0b010` — data cache only.
    DataOnly = 0b010,
    /// `0b011` — separate instruction and data caches.
    Separate = 0b011,
    /// `0b100` — unified cache.
    Unified = 0b100,
    /// `0b101..=0b111` — reserved encodings.
    Reserved = 0b111,
}

impl CacheType {
    #[must_use]
    pub const fn from_bits(value: u8) -> Self {
        match value {
            0b000 => Self::None,
            0b001 => Self::InstructionOnly,
            0b010 => Self::DataOnly,
            0b011 => Self::Separate,
            0b100 => Self::Unified,
            _ => Self::Reserved,
        }
    }

    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    /// Whether this level caches data (data-only, separate I+D, or unified).
    #[must_use]
    pub const fn holds_data(self) -> bool {
        matches!(self, Self::DataOnly | Self::Separate | Self::Unified)
    }
}

/// `CLIDR_EL1` — Cache Level ID Register.
///
/// Identifies the type of cache at each of up to seven levels, and the
/// Level of Coherence / Unification.
#[bitfield(u64)]
#[derive(Eq, PartialEq)]
pub struct ClidrEl1 {
    /// Bits 0–2 — Ctype1.
    #[bits(3)]
    pub ctype1: CacheType,
    /// Bits 3–5 — Ctype2.
    #[bits(3)]
    pub ctype2: CacheType,
    /// Bits 6–8 — Ctype3.
    #[bits(3)]
    pub ctype3: CacheType,
    /// Bits 9–11 — Ctype4.
    #[bits(3)]
    pub ctype4: CacheType,
    /// Bits 12–14 — Ctype5.
    #[bits(3)]
    pub ctype5: CacheType,
    /// Bits 15–17 — Ctype6.
    #[bits(3)]
    pub ctype6: CacheType,
    /// Bits 18–20 — Ctype7.
    #[bits(3)]
    pub ctype7: CacheType,

    /// Bits 21–23 — LoUIS: Level of Unification Inner Shareable.
    #[bits(3)]
    pub louis: u8,
    /// Bits 24–26 — LoC: Level of Coherence.
    #[bits(3)]
    pub loc: u8,
    /// Bits 27–29 — LoUU: Level of Unification Uniprocessor.
    #[bits(3)]
    pub louu: u8,
    /// Bits 30–32 — ICB: Inner Cache Boundary.
    #[bits(3)]
    pub icb: u8,
    /// Bits 33–46 — Ttype1..7 (`FEAT_MTE2` tag cache types).
    #[bits(14)]
    pub ttypes: u16,

    /// Bits 47–63 — Reserved.
    #[bits(17)]
    _res47: u32,
}

impl ClidrEl1 {
    /// The cache type at `level` (1-based, `1..=7`).
    ///
    /// Levels outside the architectural range read as [`CacheType::None`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn ctype(&self, level: u8) -> CacheType {
        if level == 0 || level > CLIDR_MAX_LEVELS {
            return CacheType::None;
        }
        let shift = 3 * (level - 1);
        let bits = (self.into_bits() >> shift) & 0b111;
        CacheType::from_bits(bits as u8)
    }

    /// The deepest level (1-based) holding data, walking `Ctype7` down to `Ctype1`.
    #[must_use]
    pub fn deepest_data_level(&self) -> Option<u8> {
        (1..=CLIDR_MAX_LEVELS)
            .rev()
            .find(|&level| self.ctype(level).holds_data())
    }
}

#[cfg(all(feature = "asm", target_arch = "aarch64"))]
impl crate::LoadRegisterUnsafe for ClidrEl1 {
    #[inline]
    unsafe fn load_unsafe() -> Self {
        let raw: u64;
        unsafe {
            core::arch::asm!("mrs {}, clidr_el1", out(reg) raw, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(raw)
    }
}
