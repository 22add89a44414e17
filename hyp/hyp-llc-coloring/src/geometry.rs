use crate::color::Color;
use crate::error::GeometryError;
use core::fmt;
use hyp_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage};
use log::{error, warn};

/// Upper bound on the number of colors a platform may expose.
pub const MAX_LLC_COLORS: u32 = 1024;

/// Fewer than two colors leaves nothing to partition.
pub const MIN_LLC_COLORS: u32 = 2;

/// How the LLC partitions physical memory.
///
/// A page's color is `(address & addr_color_mask) >> page_shift`: the address
/// bits between the page offset and log2 of the way size.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LlcGeometry {
    way_size: u64,
    nr_colors: u32,
    page_shift: u32,
}

impl LlcGeometry {
    /// Derive the geometry for pages of size `S` from the LLC way size.
    ///
    /// A way size that is not a power of two is rounded down to one, which
    /// costs isolation quality but keeps coloring usable.
    ///
    /// # Errors
    /// [`GeometryError::WaySizeTooSmall`] if not even one page fits in a way,
    /// [`GeometryError::ColorCountOutOfRange`] if the color count lies outside
    /// [`MIN_LLC_COLORS`]`..=`[`MAX_LLC_COLORS`].
    pub fn from_way_size<S: PageSize>(way_size: u64) -> Result<Self, GeometryError> {
        if way_size < S::SIZE {
            error!("LLC way size {way_size} is smaller than a {} page", S::as_str());
            return Err(GeometryError::WaySizeTooSmall { way_size });
        }

        let way_size = if way_size.is_power_of_two() {
            way_size
        } else {
            let rounded = 1 << way_size.ilog2();
            warn!(
                "LLC way size ({} KiB) isn't a power of 2, using {} KiB; performance may be degraded",
                way_size / 1024,
                rounded / 1024
            );
            rounded
        };

        let nr_colors = way_size >> S::SHIFT;
        if !(u64::from(MIN_LLC_COLORS)..=u64::from(MAX_LLC_COLORS)).contains(&nr_colors) {
            error!(
                "Number of LLC colors ({nr_colors}) not in range [{MIN_LLC_COLORS}, {MAX_LLC_COLORS}]"
            );
            return Err(GeometryError::ColorCountOutOfRange {
                nr_colors,
                min: MIN_LLC_COLORS,
                max: MAX_LLC_COLORS,
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let nr_colors = nr_colors as u32;
        Ok(Self {
            way_size,
            nr_colors,
            page_shift: S::SHIFT,
        })
    }

    /// LLC way size in bytes, always a power of two.
    #[must_use]
    pub const fn way_size(&self) -> u64 {
        self.way_size
    }

    #[must_use]
    pub const fn nr_colors(&self) -> u32 {
        self.nr_colors
    }

    #[must_use]
    pub const fn page_shift(&self) -> u32 {
        self.page_shift
    }

    /// Mask selecting the color bits of a physical address.
    #[must_use]
    pub const fn addr_color_mask(&self) -> u64 {
        (self.nr_colors as u64 - 1) << self.page_shift
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn addr_to_color(&self, addr: PhysicalAddress) -> Color {
        Color::new(((addr.as_u64() & self.addr_color_mask()) >> self.page_shift) as u32)
    }

    #[must_use]
    pub const fn page_to_color<S: PageSize>(&self, page: PhysicalPage<S>) -> Color {
        self.addr_to_color(page.base())
    }
}

impl fmt::Display for LlcGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "way size {} KiB, {} colors, mask {:#x}",
            self.way_size / 1024,
            self.nr_colors,
            self.addr_color_mask()
        )
    }
}
