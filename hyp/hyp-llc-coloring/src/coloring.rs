use crate::color::Color;
use crate::error::GeometryError;
use crate::geometry::LlcGeometry;
use crate::topology::{CacheTopology, probe_llc_way_size};
use core::sync::atomic::{AtomicBool, Ordering};
use hyp_console::KeyHandler;
use hyp_memory_addresses::{PageSize, PhysicalPage, Size4K};
use hyp_sync::SyncOnceCell;
use log::{error, info};

/// Whether LLC coloring is active, and with which geometry.
///
/// Starts disabled. A successful [`init`](Self::init) enables it for the rest
/// of the hypervisor's life; every query on a disabled instance answers as if
/// coloring did not exist.
pub struct LlcColoring {
    init_called: AtomicBool,
    geometry: SyncOnceCell<LlcGeometry>,
}

impl core::fmt::Debug for LlcColoring {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LlcColoring")
            .field("init_called", &self.init_called)
            .finish_non_exhaustive()
    }
}

impl Default for LlcColoring {
    fn default() -> Self {
        Self::new()
    }
}

impl LlcColoring {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            init_called: AtomicBool::new(false),
            geometry: SyncOnceCell::new(),
        }
    }

    /// An instance enabled with a known geometry, skipping the probe.
    #[must_use]
    pub fn with_geometry(geometry: LlcGeometry) -> Self {
        let this = Self::new();
        this.init_called.store(true, Ordering::Relaxed);
        // Fresh cell; cannot be occupied.
        let _ = this.geometry.set(geometry);
        this
    }

    /// Establish the geometry from `way_size_override` or, failing that, from
    /// the cache topology, for 4 KiB pages.
    ///
    /// On error coloring stays disabled.
    ///
    /// # Errors
    /// [`GeometryError::ProbeFailed`] when there is no override and no LLC was
    /// found, or any error of [`LlcGeometry::from_way_size`].
    ///
    /// # Panics
    /// If called more than once.
    pub fn init(
        &self,
        way_size_override: Option<u64>,
        topology: &impl CacheTopology,
    ) -> Result<&LlcGeometry, GeometryError> {
        assert!(
            !self.init_called.swap(true, Ordering::AcqRel),
            "LLC coloring initialized twice"
        );

        let way_size = match way_size_override.or_else(|| probe_llc_way_size(topology)) {
            Some(way_size) => way_size,
            None => {
                error!("Probed LLC way size is 0 and no custom value provided");
                return Err(GeometryError::ProbeFailed);
            }
        };

        let geometry = LlcGeometry::from_way_size::<Size4K>(way_size)?;
        info!("LLC coloring enabled: {geometry}");
        Ok(self.geometry.get_or_init(|| geometry))
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.geometry.is_initialized()
    }

    #[must_use]
    pub fn geometry(&self) -> Option<&LlcGeometry> {
        self.geometry.get()
    }

    /// Number of colors, `0` while disabled.
    #[must_use]
    pub fn max_nr_colors(&self) -> u32 {
        self.geometry().map_or(0, LlcGeometry::nr_colors)
    }

    #[must_use]
    pub fn page_to_color<S: PageSize>(&self, page: PhysicalPage<S>) -> Option<Color> {
        self.geometry().map(|g| g.page_to_color(page))
    }

    /// Log the coloring state.
    pub fn dump(&self) {
        info!("LLC coloring info:");
        match self.geometry() {
            None => info!("    LLC coloring disabled"),
            Some(g) => {
                info!("    Number of LLC colors supported: {}", g.nr_colors());
                info!("    LLC way size: {} KiB", g.way_size() / 1024);
                info!("    Address to LLC color mask: {:#x}", g.addr_color_mask());
            }
        }
    }
}

impl KeyHandler for LlcColoring {
    fn handle(&self, _key: char) {
        self.dump();
    }
}
