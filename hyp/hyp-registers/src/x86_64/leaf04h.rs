use crate::x86_64::CpuidResult;
use bitfield_struct::bitfield;

/// Leaf 04h EAX bits 0–4 — cache type.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum CpuidCacheType {
    /// No more caches; terminates subleaf enumeration.
    Null = 0,
    Data = 1,
    Instruction = 2,
    Unified = 3,
    Reserved = 0x1F,
}

impl CpuidCacheType {
    #[must_use]
    pub const fn from_bits(value: u8) -> Self {
        match value {
            0 => Self::Null,
            1 => Self::Data,
            2 => Self::Instruction,
            3 => Self::Unified,
            _ => Self::Reserved,
        }
    }

    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    /// Whether this cache holds data.
    #[must_use]
    pub const fn holds_data(self) -> bool {
        matches!(self, Self::Data | Self::Unified)
    }
}

/// Leaf 04h EAX.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct Leaf04hEax {
    /// Bits 0–4 — cache type.
    #[bits(5)]
    pub cache_type: CpuidCacheType,
    /// Bits 5–7 — cache level, starting at 1.
    #[bits(3)]
    pub cache_level: u8,
    /// Bit 8 — self-initializing cache level.
    pub self_initializing: bool,
    /// Bit 9 — fully associative cache.
    pub fully_associative: bool,
    /// Bits 10–13 — reserved.
    #[bits(4)]
    _res10: u8,
    /// Bits 14–25 — maximum number of logical processors sharing this cache, minus one.
    #[bits(12)]
    pub max_sharing: u16,
    /// Bits 26–31 — maximum number of core IDs in the package, minus one.
    #[bits(6)]
    pub max_core_ids: u8,
}

/// Leaf 04h EBX.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct Leaf04hEbx {
    /// Bits 0–11 — system coherency line size, minus one.
    #[bits(12)]
    pub line_size: u16,
    /// Bits 12–21 — physical line partitions, minus one.
    #[bits(10)]
    pub partitions: u16,
    /// Bits 22–31 — ways of associativity, minus one.
    #[bits(10)]
    pub ways: u16,
}

/// Leaf 04h EDX.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct Leaf04hEdx {
    /// Bit 0 — WBINVD/INVD does not act on lower levels for sharing threads.
    pub wbinvd_not_inclusive: bool,
    /// Bit 1 — cache is inclusive of lower levels.
    pub inclusive: bool,
    /// Bit 2 — complex cache indexing.
    pub complex_indexing: bool,
    #[bits(29)]
    _res3: u32,
}

/// One subleaf of CPUID leaf 04h.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Leaf04h {
    pub eax: Leaf04hEax,
    pub ebx: Leaf04hEbx,
    /// ECX — number of sets, minus one.
    pub sets_minus_one: u32,
    pub edx: Leaf04hEdx,
}

#[allow(clippy::cast_lossless)]
impl Leaf04h {
    /// Query subleaf `index` of leaf 04h.
    ///
    /// # Safety
    /// The CPUID instruction must be available.
    #[cfg(all(feature = "asm", target_arch = "x86_64"))]
    #[must_use]
    pub unsafe fn new(index: u32) -> Self {
        let res = unsafe { crate::x86_64::cpuid(crate::x86_64::CPUID_LEAF_CACHE_PARAMETERS, index) };
        Self::from(res)
    }

    #[must_use]
    pub const fn cache_type(&self) -> CpuidCacheType {
        self.eax.cache_type()
    }

    #[must_use]
    pub const fn level(&self) -> u8 {
        self.eax.cache_level()
    }

    /// Bytes per cache line.
    #[must_use]
    pub const fn line_size(&self) -> u32 {
        self.ebx.line_size() as u32 + 1
    }

    #[must_use]
    pub const fn partitions(&self) -> u32 {
        self.ebx.partitions() as u32 + 1
    }

    #[must_use]
    pub const fn ways(&self) -> u32 {
        self.ebx.ways() as u32 + 1
    }

    #[must_use]
    pub const fn sets(&self) -> u32 {
        self.sets_minus_one.saturating_add(1)
    }

    /// Cache capacity in bytes: ways × partitions × line size × sets.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.ways() as u64 * self.partitions() as u64 * self.line_size() as u64 * self.sets() as u64
    }
}

impl From<CpuidResult> for Leaf04h {
    fn from(res: CpuidResult) -> Self {
        Self {
            eax: Leaf04hEax::from_bits(res.eax),
            ebx: Leaf04hEbx::from_bits(res.ebx),
            sets_minus_one: res.ecx,
            edx: Leaf04hEdx::from_bits(res.edx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_unified_l3() {
        // 16-way, 64-byte lines, 8192 sets: 8 MiB unified L3.
        let res = CpuidResult {
            eax: Leaf04hEax::new()
                .with_cache_type(CpuidCacheType::Unified)
                .with_cache_level(3)
                .with_self_initializing(true)
                .into_bits(),
            ebx: Leaf04hEbx::new().with_line_size(63).with_ways(15).into_bits(),
            ecx: 8191,
            edx: 0b10,
        };
        let leaf = Leaf04h::from(res);
        assert_eq!(leaf.cache_type(), CpuidCacheType::Unified);
        assert_eq!(leaf.level(), 3);
        assert_eq!(leaf.line_size(), 64);
        assert_eq!(leaf.partitions(), 1);
        assert_eq!(leaf.ways(), 16);
        assert_eq!(leaf.sets(), 8192);
        assert_eq!(leaf.size(), 8 * 1024 * 1024);
        assert!(leaf.edx.inclusive());
    }

    #[test]
    fn null_type_terminates() {
        let leaf = Leaf04h::from(CpuidResult::default());
        assert_eq!(leaf.cache_type(), CpuidCacheType::Null);
        assert!(!leaf.cache_type().holds_data());
    }
}
