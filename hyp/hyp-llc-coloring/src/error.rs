use crate::color::Color;
use crate::domain::DomainId;
use hyp_memory_addresses::Frame;

/// Why the LLC geometry could not be established.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("probed LLC way size is 0 and no custom value provided")]
    ProbeFailed,
    #[error("LLC way size of {way_size} bytes is smaller than a page")]
    WaySizeTooSmall { way_size: u64 },
    #[error("number of LLC colors ({nr_colors}) not in range [{min}, {max}]")]
    ColorCountOutOfRange { nr_colors: u64, min: u32, max: u32 },
}

/// A color set given by the administrator (or a toolstack) was rejected.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum ColorConfigError {
    #[error("empty LLC color configuration")]
    Empty,
    #[error("malformed LLC color configuration at byte {position}")]
    Malformed { position: usize },
    #[error("invalid LLC color range {start}-{end}")]
    InvertedRange { start: u64, end: u64 },
    #[error("too many LLC colors ({count}, at most {max} supported)")]
    TooManyColors { count: u64, max: usize },
    #[error("LLC color {color} out of range (max {max})")]
    ColorOutOfRange { color: u64, max: usize },
    #[error("duplicate LLC color {0}")]
    DuplicateColor(Color),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum HeapError {
    #[error("page {0} is not covered by the frame table")]
    OutOfRange(Frame),
    #[error("page {0} is not managed by the colored heap")]
    NotColored(Frame),
    #[error("page {0} is already free")]
    DoubleFree(Frame),
    #[error("page {0} is already managed by a heap")]
    AlreadyManaged(Frame),
    #[error("page {0} was never given to a heap")]
    Unmanaged(Frame),
}

/// A colored heap invariant that [`ColoredHeap::check_invariants`](crate::ColoredHeap::check_invariants) found broken.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("color {color} list out of address order at index {index}")]
    Unordered { color: Color, index: usize },
    #[error("page {page} is on the list of color {color} more than once")]
    Duplicate { color: Color, page: Frame },
    #[error("page {page} of color {actual} is in the list of color {list}")]
    WrongList { page: Frame, list: Color, actual: Color },
    #[error("page {0} is on a free list but not marked free and colored")]
    BadState(Frame),
    #[error("{counted} pages on the free lists but {recorded} accounted")]
    CountMismatch { counted: u64, recorded: u64 },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("{0}: LLC coloring is disabled, colors cannot be configured")]
    ColoringDisabled(DomainId),
    #[error("{domain}: {source}")]
    InvalidColors {
        domain: DomainId,
        source: ColorConfigError,
    },
    #[error("{domain}: page {page} is not owned by this domain")]
    NotOwner { domain: DomainId, page: Frame },
    #[error(transparent)]
    Heap(#[from] HeapError),
}

/// A hypervisor command line value could not be parsed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum CmdlineError {
    #[error("invalid boolean")]
    Bool,
    #[error("invalid size")]
    Size,
    #[error("invalid integer")]
    Integer,
}
