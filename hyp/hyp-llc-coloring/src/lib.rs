//! # Last-Level Cache Coloring
//!
//! Partitions physical memory by the LLC sets its pages map to ("colors") and
//! hands each domain pages only from the colors it was given, so that domains
//! on different colors cannot evict each other's cache lines.
//!
//! ## Pieces
//!
//! | Module | Role |
//! |--------|------|
//! | [`topology`] | Finds the last-level cache (AArch64 cache ID registers or CPUID leaf `04h`) |
//! | [`geometry`] | Way size → number of colors and the address-to-color mask |
//! | [`coloring`] | [`LlcColoring`], the boot-once capability; disabled unless initialized |
//! | [`color`] | Color sets: `"0,2-6,15-16"` parsing, validation, the default set |
//! | [`heap`] | [`ColoredHeap`], one address-ordered free list per color |
//! | [`domain`] | Domains with their color binding and owned pages |
//! | [`domheap`] | [`DomainHeap`], routing domain allocations between the colored and the ordinary heap |
//! | [`config`], [`boot`] | Command line keys and boot-time setup |
//!
//! ## Example
//!
//! ```rust
//! use hyp_llc_coloring::*;
//! use hyp_memory_addresses::Size4K;
//!
//! // 2 MiB ways of 4 KiB pages
//! let geometry = LlcGeometry::from_way_size::<Size4K>(2 * 1024 * 1024).unwrap();
//! assert_eq!(geometry.nr_colors(), 512);
//! assert_eq!(geometry.addr_color_mask(), 0x1F_F000);
//!
//! let colors = parse_color_config("0,2-6,15-16", 512).unwrap();
//! assert_eq!(colors.len(), 8);
//! assert!(validate(&colors, 512));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod boot;
pub mod color;
pub mod coloring;
pub mod config;
pub mod domain;
pub mod domheap;
mod error;
pub mod frame_table;
pub mod geometry;
pub mod heap;
pub mod maintenance;
mod num;
pub mod topology;

#[cfg(test)]
mod testing;

pub use color::{Color, check, default_colors, parse_color_config, validate};
pub use coloring::LlcColoring;
pub use config::ColoringConfig;
pub use domain::{Domain, DomainColoring, DomainConfig, DomainId, DomainKind};
pub use domheap::{DomainHeap, FallbackHeap, NoFallback};
pub use error::{
    CmdlineError, ColorConfigError, DomainError, GeometryError, HeapError, InvariantViolation,
};
pub use frame_table::{FrameTable, PageFlags, PageInfo, PageState};
pub use geometry::{LlcGeometry, MAX_LLC_COLORS, MIN_LLC_COLORS};
pub use heap::{ColoredHeap, HeapDump, MemFlags};
pub use maintenance::PageMaintenance;
pub use topology::{CacheDescriptor, CacheKind, CacheTopology, StaticTopology, probe_llc_way_size};
