//! Last-level cache discovery.
//!
//! The geometry probe only needs the way size of the deepest data-holding
//! cache. Where that comes from is behind [`CacheTopology`]: the AArch64
//! cache ID registers, CPUID leaf `04h`, or a description known up front.

use core::fmt;
use hyp_registers::aarch64::{CLIDR_MAX_LEVELS, CacheSizeId, CacheType, ClidrEl1, CsselrEl1, IdAa64Mmfr2El1};
use hyp_registers::x86_64::{CPUID_LEAF_CACHE_PARAMETERS, CpuidCacheType, CpuidResult, Leaf04h};
use log::{debug, info};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CacheKind {
    Data,
    /// Separate instruction and data caches at the same level.
    Separate,
    Unified,
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Data => "data",
            Self::Separate => "separate I/D",
            Self::Unified => "unified",
        })
    }
}

/// One cache level as reported by the hardware.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CacheDescriptor {
    /// 1-based cache level.
    pub level: u8,
    pub kind: CacheKind,
    /// Bytes per line.
    pub line_size: u32,
    pub sets: u32,
    pub ways: u32,
    /// Physical line partitions (x86); always 1 on Arm.
    pub partitions: u32,
}

impl CacheDescriptor {
    /// Bytes covered by one way: line size × partitions × sets.
    #[must_use]
    pub const fn way_size(&self) -> u64 {
        self.line_size as u64 * self.partitions as u64 * self.sets as u64
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.way_size() * self.ways as u64
    }
}

impl fmt::Display for CacheDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "L{} {} {} KiB, {}-way, {} sets, {} B lines",
            self.level,
            self.kind,
            self.size() / 1024,
            self.ways,
            self.sets,
            self.line_size
        )
    }
}

pub trait CacheTopology {
    /// The deepest cache level that holds data, if any.
    fn last_level_cache(&self) -> Option<CacheDescriptor>;
}

impl<T: CacheTopology + ?Sized> CacheTopology for &T {
    fn last_level_cache(&self) -> Option<CacheDescriptor> {
        (**self).last_level_cache()
    }
}

/// A topology that was described ahead of time (firmware tables, tests).
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct StaticTopology(pub Option<CacheDescriptor>);

impl CacheTopology for StaticTopology {
    fn last_level_cache(&self) -> Option<CacheDescriptor> {
        self.0
    }
}

/// Way size of the last-level cache, or `None` if no data cache was found.
#[must_use]
pub fn probe_llc_way_size(topology: &impl CacheTopology) -> Option<u64> {
    let llc = topology.last_level_cache()?;
    info!("LLC found: {llc} (way size {} KiB)", llc.way_size() / 1024);
    match llc.way_size() {
        0 => None,
        way_size => Some(way_size),
    }
}

/// Access to the AArch64 cache identification registers.
pub trait CacheIdRegisters {
    fn clidr(&self) -> ClidrEl1;
    fn mmfr2(&self) -> IdAa64Mmfr2El1;
    fn csselr(&self) -> CsselrEl1;
    /// Writes `CSSELR_EL1` and synchronizes so the next [`ccsidr`](Self::ccsidr) reflects it.
    fn select(&self, sel: CsselrEl1);
    /// Raw `CCSIDR_EL1` for the currently selected cache.
    fn ccsidr(&self) -> u64;
}

/// Walks `CLIDR_EL1` from the deepest level down and reads the geometry of
/// the first one that holds data.
#[derive(Debug, Clone, Default)]
pub struct Aarch64CacheTopology<R> {
    regs: R,
}

impl<R: CacheIdRegisters> Aarch64CacheTopology<R> {
    pub const fn new(regs: R) -> Self {
        Self { regs }
    }
}

impl<R: CacheIdRegisters> CacheTopology for Aarch64CacheTopology<R> {
    fn last_level_cache(&self) -> Option<CacheDescriptor> {
        let clidr = self.regs.clidr();
        let (level, kind) = (1..=CLIDR_MAX_LEVELS).rev().find_map(|level| {
            let kind = match clidr.ctype(level) {
                CacheType::DataOnly => CacheKind::Data,
                CacheType::Separate => CacheKind::Separate,
                CacheType::Unified => CacheKind::Unified,
                _ => return None,
            };
            Some((level, kind))
        })?;

        let ccidx = self.regs.mmfr2().has_ccidx();
        let saved = self.regs.csselr();
        self.regs.select(CsselrEl1::data_level(level));
        let raw = self.regs.ccsidr();
        self.regs.select(saved);

        let id = CacheSizeId::decode(raw, ccidx);
        debug!("CCSIDR_EL1 for L{level}: {raw:#x} (ccidx: {ccidx})");
        Some(CacheDescriptor {
            level,
            kind,
            line_size: id.line_size,
            sets: id.sets,
            ways: id.ways,
            partitions: 1,
        })
    }
}

/// The current CPU's cache ID system registers.
#[cfg(all(feature = "asm", target_arch = "aarch64"))]
#[derive(Debug, Copy, Clone, Default)]
pub struct SysregCacheIdRegisters;

#[cfg(all(feature = "asm", target_arch = "aarch64"))]
impl CacheIdRegisters for SysregCacheIdRegisters {
    fn clidr(&self) -> ClidrEl1 {
        use hyp_registers::LoadRegisterUnsafe;
        unsafe { ClidrEl1::load_unsafe() }
    }

    fn mmfr2(&self) -> IdAa64Mmfr2El1 {
        use hyp_registers::LoadRegisterUnsafe;
        unsafe { IdAa64Mmfr2El1::load_unsafe() }
    }

    fn csselr(&self) -> CsselrEl1 {
        use hyp_registers::LoadRegisterUnsafe;
        unsafe { CsselrEl1::load_unsafe() }
    }

    fn select(&self, sel: CsselrEl1) {
        use hyp_registers::StoreRegisterUnsafe;
        unsafe { sel.store_unsafe() };
        hyp_registers::aarch64::isb();
    }

    fn ccsidr(&self) -> u64 {
        use hyp_registers::LoadRegisterUnsafe;
        unsafe { hyp_registers::aarch64::CcsidrEl1::load_unsafe() }.into_bits()
    }
}

/// Source of CPUID results.
pub trait CpuidSource {
    fn cpuid(&self, leaf: u32, subleaf: u32) -> CpuidResult;
}

/// Enumerates CPUID leaf `04h` and picks the deepest data or unified cache.
#[derive(Debug, Clone, Default)]
pub struct CpuidCacheTopology<C> {
    source: C,
}

impl<C: CpuidSource> CpuidCacheTopology<C> {
    /// Upper bound on sub-leaves, in case a hypervisor below us never reports
    /// the terminating null entry.
    const MAX_SUBLEAVES: u32 = 16;

    pub const fn new(source: C) -> Self {
        Self { source }
    }
}

impl<C: CpuidSource> CacheTopology for CpuidCacheTopology<C> {
    fn last_level_cache(&self) -> Option<CacheDescriptor> {
        (0..Self::MAX_SUBLEAVES)
            .map(|i| Leaf04h::from(self.source.cpuid(CPUID_LEAF_CACHE_PARAMETERS, i)))
            .take_while(|leaf| leaf.cache_type() != CpuidCacheType::Null)
            .filter(|leaf| leaf.cache_type().holds_data())
            .max_by_key(Leaf04h::level)
            .map(|leaf| CacheDescriptor {
                level: leaf.level(),
                kind: if leaf.cache_type() == CpuidCacheType::Unified {
                    CacheKind::Unified
                } else {
                    CacheKind::Data
                },
                line_size: leaf.line_size(),
                sets: leaf.sets(),
                ways: leaf.ways(),
                partitions: leaf.partitions(),
            })
    }
}

/// The `cpuid` instruction of the current CPU.
#[cfg(all(feature = "asm", target_arch = "x86_64"))]
#[derive(Debug, Copy, Clone, Default)]
pub struct NativeCpuid;

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl CpuidSource for NativeCpuid {
    fn cpuid(&self, leaf: u32, subleaf: u32) -> CpuidResult {
        unsafe { hyp_registers::x86_64::cpuid(leaf, subleaf) }
    }
}
