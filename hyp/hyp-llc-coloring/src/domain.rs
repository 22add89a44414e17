//! Domains as far as memory coloring is concerned: an id, a color binding
//! fixed at creation, and the pages the domain owns.

use crate::color::{Color, ColorRanges, check, default_colors, parse_color_config};
use crate::coloring::LlcColoring;
use crate::error::{ColorConfigError, DomainError};
use crate::frame_table::PageInfo;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use hyp_memory_addresses::Frame;
use hyp_sync::SpinLock;
use log::{debug, error, info, warn};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DomainId(u16);

impl DomainId {
    /// The hardware domain.
    pub const HARDWARE: Self = Self(0);

    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

impl fmt::Debug for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DomainKind {
    /// Has direct hardware access; falls back to all colors on bad configuration.
    Hardware,
    Guest,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DomainConfig {
    pub id: DomainId,
    pub kind: DomainKind,
    /// Color set in the `0,2-6` syntax; `None` selects every color.
    pub llc_colors: Option<String>,
}

impl DomainConfig {
    #[must_use]
    pub const fn guest(id: u16) -> Self {
        Self {
            id: DomainId::new(id),
            kind: DomainKind::Guest,
            llc_colors: None,
        }
    }

    #[must_use]
    pub fn with_llc_colors(mut self, spec: &str) -> Self {
        self.llc_colors = Some(String::from(spec));
        self
    }
}

/// The colors a domain may allocate from. Immutable once created.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DomainColoring {
    colors: Vec<Color>,
}

impl DomainColoring {
    /// Bind to a private copy of `colors`.
    ///
    /// # Errors
    /// See [`check`](crate::color::check).
    pub fn new(colors: &[Color], max_colors: u32) -> Result<Self, ColorConfigError> {
        check(colors, max_colors as usize)?;
        Ok(Self {
            colors: colors.to_vec(),
        })
    }

    /// Parse and bind a textual color set.
    ///
    /// # Errors
    /// Any parse or validation error; nothing is bound then.
    pub fn from_spec(spec: &str, max_colors: u32) -> Result<Self, ColorConfigError> {
        let colors = parse_color_config(spec, max_colors as usize)?;
        Self::new(&colors, max_colors)
    }

    /// Every color.
    #[must_use]
    pub fn all(max_colors: u32) -> Self {
        Self {
            colors: default_colors(max_colors),
        }
    }

    /// Colors in configuration order.
    #[must_use]
    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

pub struct Domain {
    id: DomainId,
    kind: DomainKind,
    coloring: Option<DomainColoring>,
    page_list: SpinLock<Vec<Frame>>,
}

impl Domain {
    /// Create a domain and bind its colors.
    ///
    /// # Errors
    /// [`DomainError::ColoringDisabled`] if colors are configured while
    /// coloring is off, [`DomainError::InvalidColors`] if a guest's color set
    /// is rejected. A hardware domain with a bad color set gets every color.
    pub fn create(config: DomainConfig, llc: &LlcColoring) -> Result<Self, DomainError> {
        let DomainConfig {
            id,
            kind,
            llc_colors,
        } = config;
        let max_colors = llc.max_nr_colors();

        let coloring = match (llc.is_enabled(), llc_colors.as_deref()) {
            (false, None) => None,
            (false, Some(_)) => return Err(DomainError::ColoringDisabled(id)),
            (true, None) => {
                info!("{id}: LLC colors not configured, using default colors");
                Some(DomainColoring::all(max_colors))
            }
            (true, Some(spec)) => match DomainColoring::from_spec(spec, max_colors) {
                Ok(coloring) => Some(coloring),
                Err(e) if kind == DomainKind::Hardware => {
                    error!("{id}: invalid LLC color configuration \"{spec}\" ({e}), using default colors");
                    Some(DomainColoring::all(max_colors))
                }
                Err(source) => {
                    return Err(DomainError::InvalidColors { domain: id, source });
                }
            },
        };

        let domain = Self {
            id,
            kind,
            coloring,
            page_list: SpinLock::new(Vec::new()),
        };
        debug!("{}", domain.llc_colors());
        Ok(domain)
    }

    #[must_use]
    pub const fn id(&self) -> DomainId {
        self.id
    }

    #[must_use]
    pub const fn kind(&self) -> DomainKind {
        self.kind
    }

    #[must_use]
    pub const fn is_colored(&self) -> bool {
        self.coloring.is_some()
    }

    #[must_use]
    pub const fn coloring(&self) -> Option<&DomainColoring> {
        self.coloring.as_ref()
    }

    /// Display adapter for the color binding.
    #[must_use]
    pub const fn llc_colors(&self) -> DomainColorsDump<'_> {
        DomainColorsDump(self)
    }

    /// Pages currently owned.
    #[must_use]
    pub fn page_list(&self) -> Vec<Frame> {
        self.page_list.with_lock(|list| list.clone())
    }

    #[must_use]
    pub fn tot_pages(&self) -> u64 {
        self.page_list.with_lock(|list| list.len() as u64)
    }

    #[must_use]
    pub fn owns(&self, page: Frame) -> bool {
        self.page_list.with_lock(|list| list.contains(&page))
    }

    pub(crate) fn assign_page(&self, page: Frame, info: &PageInfo) {
        self.page_list.with_lock(|list| {
            info.set_owner(Some(self.id));
            list.push(page);
        });
    }

    /// Drop `page` from the page list. The frame keeps its owner until the
    /// allocator takes it back.
    pub(crate) fn release_page(&self, page: Frame) -> bool {
        self.page_list.with_lock(|list| {
            list.iter()
                .position(|&p| p == page)
                .map(|i| list.swap_remove(i))
                .is_some()
        })
    }

    pub(crate) fn take_pages(&self) -> Vec<Frame> {
        self.page_list.with_lock(core::mem::take)
    }
}

impl Drop for Domain {
    fn drop(&mut self) {
        let left = self.page_list.get_mut().len();
        if left != 0 {
            warn!("{}: destroyed with {left} pages still assigned", self.id);
        }
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("coloring", &self.coloring)
            .finish_non_exhaustive()
    }
}

/// `d1 has 4 LLC colors: 0-3`
pub struct DomainColorsDump<'a>(&'a Domain);

impl fmt::Display for DomainColorsDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.coloring {
            None => write!(f, "{} is not LLC colored", self.0.id),
            Some(c) => write!(
                f,
                "{} has {} LLC colors: {}",
                self.0.id,
                c.len(),
                ColorRanges(c.colors())
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LlcGeometry;
    use hyp_memory_addresses::Size4K;

    fn enabled(nr_colors: u64) -> LlcColoring {
        LlcColoring::with_geometry(LlcGeometry::from_way_size::<Size4K>(nr_colors * 4096).unwrap())
    }

    fn colors(v: &[u32]) -> Vec<Color> {
        v.iter().copied().map(Color::new).collect()
    }

    #[test]
    fn guest_with_explicit_colors() {
        let d = Domain::create(DomainConfig::guest(1).with_llc_colors("0-3,8"), &enabled(16)).unwrap();
        assert!(d.is_colored());
        assert_eq!(d.coloring().unwrap().colors(), colors(&[0, 1, 2, 3, 8]));
        assert_eq!(d.llc_colors().to_string(), "d1 has 5 LLC colors: 0-3, 8");
    }

    #[test]
    fn missing_colors_default_to_all() {
        let d = Domain::create(DomainConfig::guest(2), &enabled(8)).unwrap();
        assert_eq!(d.coloring().unwrap().colors(), default_colors(8));
        assert_eq!(d.llc_colors().to_string(), "d2 has 8 LLC colors: 0-7");
    }

    #[test]
    fn guest_with_bad_colors_is_not_created() {
        let llc = enabled(8);
        for (spec, source) in [
            ("5-2", ColorConfigError::InvertedRange { start: 5, end: 2 }),
            ("0,8", ColorConfigError::ColorOutOfRange { color: 8, max: 8 }),
            ("1,1", ColorConfigError::DuplicateColor(Color::new(1))),
            ("0,1,", ColorConfigError::Malformed { position: 4 }),
        ] {
            let err = Domain::create(DomainConfig::guest(3).with_llc_colors(spec), &llc).unwrap_err();
            assert_eq!(
                err,
                DomainError::InvalidColors {
                    domain: DomainId::new(3),
                    source
                }
            );
        }
    }

    #[test]
    fn hardware_domain_falls_back_to_all_colors() {
        let config = DomainConfig {
            id: DomainId::HARDWARE,
            kind: DomainKind::Hardware,
            llc_colors: Some(String::from("0-99")),
        };
        let d = Domain::create(config, &enabled(8)).unwrap();
        assert_eq!(d.coloring().unwrap().len(), 8);
    }

    #[test]
    fn colors_need_coloring_enabled() {
        let llc = LlcColoring::new();
        assert_eq!(
            Domain::create(DomainConfig::guest(4).with_llc_colors("0"), &llc).unwrap_err(),
            DomainError::ColoringDisabled(DomainId::new(4))
        );
        let d = Domain::create(DomainConfig::guest(4), &llc).unwrap();
        assert!(!d.is_colored());
        assert_eq!(d.llc_colors().to_string(), "d4 is not LLC colored");
    }

    #[test]
    fn page_list_bookkeeping() {
        let d = Domain::create(DomainConfig::guest(5), &LlcColoring::new()).unwrap();
        let info = PageInfo::new();
        let page = Frame::from_pfn(0x42);
        d.assign_page(page, &info);
        assert_eq!(info.owner(), Some(DomainId::new(5)));
        assert!(d.owns(page));
        assert_eq!(d.tot_pages(), 1);
        assert!(d.release_page(page));
        assert!(!d.release_page(page));
        assert_eq!(d.tot_pages(), 0);
        assert!(d.take_pages().is_empty());
    }

    #[test]
    fn binding_is_a_validated_copy() {
        let source = colors(&[3, 1]);
        let binding = DomainColoring::new(&source, 4).unwrap();
        assert_eq!(binding.colors(), colors(&[3, 1]));
        assert_eq!(
            DomainColoring::new(&colors(&[0, 1, 2, 3, 0]), 4),
            Err(ColorConfigError::TooManyColors { count: 5, max: 4 })
        );
    }
}
