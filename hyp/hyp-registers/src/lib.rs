//! # Typed Cache Identification Registers
//!
//! Bitfield views of the registers a hypervisor reads to discover the cache
//! hierarchy:
//!
//! | Architecture | Register | Purpose |
//! |--------------|----------|---------|
//! | AArch64 | [`ClidrEl1`](aarch64::ClidrEl1) | Cache type per level (`Ctype1..7`) |
//! | AArch64 | [`CsselrEl1`](aarch64::CsselrEl1) | Selects the level `CCSIDR_EL1` describes |
//! | AArch64 | [`CcsidrEl1`](aarch64::CcsidrEl1) / [`CcsidrEl1Ccidx`](aarch64::CcsidrEl1Ccidx) | Line size, associativity and set count |
//! | AArch64 | [`IdAa64Mmfr2El1`](aarch64::IdAa64Mmfr2El1) | `CCIDX` tells which `CCSIDR_EL1` layout is in use |
//! | x86-64 | [`Leaf04h`](x86_64::Leaf04h) | CPUID deterministic cache parameters |
//!
//! All views are plain values and can be built from raw bits, which is how the
//! probing code is tested off-target. Reading and writing the live registers
//! requires the `asm` feature and the matching `target_arch`.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod aarch64;
pub mod x86_64;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require EL1/EL2 or ring 0.
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require EL1/EL2 or ring 0.
    unsafe fn store_unsafe(self);
}

pub trait LoadRegister {
    /// It is generally safe to load this register even from user mode.
    fn load() -> Self;
}

impl<T> LoadRegisterUnsafe for T
where
    T: LoadRegister,
{
    #[inline]
    unsafe fn load_unsafe() -> Self {
        <Self as LoadRegister>::load()
    }
}
