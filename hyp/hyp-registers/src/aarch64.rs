//! # AArch64 cache identification registers
//!
//! The cache hierarchy is described by `CLIDR_EL1` (which levels exist and
//! what they hold) and `CCSIDR_EL1` (the geometry of one level, chosen by
//! writing `CSSELR_EL1`). When `FEAT_CCIDX` is implemented
//! (`ID_AA64MMFR2_EL1.CCIDX != 0`), `CCSIDR_EL1` uses a wider 64-bit layout.
//!
//! ## References
//! - Arm ARM DDI 0487, D19.2 "General system control registers"

mod ccsidr_el1;
mod clidr_el1;
mod csselr_el1;
mod id_aa64mmfr2_el1;

pub use ccsidr_el1::{CacheSizeId, CcsidrEl1, CcsidrEl1Ccidx};
pub use clidr_el1::{CLIDR_MAX_LEVELS, CacheType, ClidrEl1};
pub use csselr_el1::CsselrEl1;
pub use id_aa64mmfr2_el1::IdAa64Mmfr2El1;

/// Instruction synchronization barrier; orders a `CSSELR_EL1` write before the
/// following `CCSIDR_EL1` read.
#[cfg(all(feature = "asm", target_arch = "aarch64"))]
#[inline]
pub fn isb() {
    unsafe { core::arch::asm!("isb", options(nomem, nostack, preserves_flags)) }
}
