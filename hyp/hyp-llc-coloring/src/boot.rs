//! Bringing coloring up at boot.

use crate::coloring::LlcColoring;
use crate::config::ColoringConfig;
use crate::error::GeometryError;
use crate::topology::CacheTopology;
use alloc::sync::Arc;
use hyp_console::{KeyHandler, KeyHandlerTable};
use log::{info, warn};

/// Enable coloring if the command line asks for it and register `'K'`.
///
/// # Errors
/// If coloring was requested but no usable geometry could be established.
/// Boot must not continue then: domains expecting isolation would receive
/// uncolored memory.
pub fn setup(
    config: &ColoringConfig,
    topology: &impl CacheTopology,
    keys: &KeyHandlerTable,
) -> Result<Arc<LlcColoring>, GeometryError> {
    let llc = Arc::new(LlcColoring::new());
    if !config.coloring_requested() {
        info!("LLC coloring disabled");
        return Ok(llc);
    }

    llc.init(config.way_size_override(), topology)?;

    let handler: Arc<dyn KeyHandler> = llc.clone();
    if let Err(e) = keys.register('K', "dump LLC coloring info", handler) {
        warn!("Cannot register LLC coloring dump: {e}");
    }
    Ok(llc)
}

/// The cache topology of the CPU we are running on.
#[cfg(all(feature = "asm", target_arch = "aarch64"))]
#[must_use]
pub const fn native_topology()
-> crate::topology::Aarch64CacheTopology<crate::topology::SysregCacheIdRegisters> {
    crate::topology::Aarch64CacheTopology::new(crate::topology::SysregCacheIdRegisters)
}

/// The cache topology of the CPU we are running on.
#[cfg(all(feature = "asm", target_arch = "x86_64"))]
#[must_use]
pub const fn native_topology() -> crate::topology::CpuidCacheTopology<crate::topology::NativeCpuid> {
    crate::topology::CpuidCacheTopology::new(crate::topology::NativeCpuid)
}
