//! # x86-64 cache identification
//!
//! CPUID leaf `04h` ("deterministic cache parameters") reports one cache per
//! subleaf. Subleaves are enumerated from `0` until one reports a null cache
//! type.

mod leaf04h;

pub use leaf04h::{CpuidCacheType, Leaf04h, Leaf04hEax, Leaf04hEbx, Leaf04hEdx};

/// CPUID leaf for deterministic cache parameters.
pub const CPUID_LEAF_CACHE_PARAMETERS: u32 = 0x04;

/// Execute CPUID with the given leaf and subleaf.
///
/// # Safety
/// The CPUID instruction must be available.
#[cfg(all(feature = "asm", target_arch = "x86_64"))]
#[inline(always)]
#[allow(unused_assignments, clippy::inline_always)]
pub unsafe fn cpuid(leaf: u32, subleaf: u32) -> CpuidResult {
    let (mut eax, mut ebx, mut ecx, mut edx) = (leaf, 0u32, subleaf, 0u32);
    unsafe {
        core::arch::asm!(
            "push rbx",
            "cpuid",
            "mov {ebx_out:e}, ebx", // rbx is reserved by LLVM
            "pop rbx",
            ebx_out = lateout(reg) ebx,
            inlateout("eax") eax,
            inlateout("ecx") ecx,
            lateout("edx") edx,
            options(nomem, preserves_flags),
        );
    }
    CpuidResult { eax, ebx, ecx, edx }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[repr(C)]
pub struct CpuidResult {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}
