//! # Physical Memory Address Types
//!
//! Strongly typed wrappers for host-physical addresses and the page frames that
//! contain them, as used by the hypervisor's page allocators.
//!
//! ## Overview
//!
//! | Type | Generic | Description |
//! |------|---------|-------------|
//! | [`PhysicalAddress`] | – | A raw 64-bit host-physical address. |
//! | [`PhysicalPage<S>`] | [`S: PageSize`](PageSize) | The page-aligned base of a physical frame of size `S`. |
//!
//! Frames are the unit the page allocators hand out. A frame can be converted
//! to and from its **page frame number** (PFN), i.e. its base address shifted
//! right by [`PageSize::SHIFT`].
//!
//! ## Page Sizes
//!
//! The three AArch64 translation granules are provided as marker types
//! implementing [`PageSize`]:
//!
//! - [`Size4K`] — 4 KiB granule (the frame size of the allocators)
//! - [`Size16K`] — 16 KiB granule
//! - [`Size64K`] — 64 KiB granule
//!
//! Cache coloring derives the number of colors from the granule: a color is the
//! set of frames whose base addresses agree in the bits between
//! [`PageSize::SHIFT`] and log2 of the LLC way size.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use hyp_memory_addresses::*;
//! let pa = PhysicalAddress::new(0x8040_1234);
//! let frame = pa.page::<Size4K>();
//! assert_eq!(frame.base().as_u64(), 0x8040_1000);
//! assert_eq!(frame.pfn(), 0x80401);
//! assert_eq!(PhysicalPage::<Size4K>::from_pfn(0x80401), frame);
//! assert_eq!(frame.next().pfn(), 0x80402);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod page_size;
mod physical_address;
mod physical_page;

pub use page_size::{PageSize, Size4K, Size16K, Size64K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;

/// The frame type handed out by the page allocators.
pub type Frame = PhysicalPage<Size4K>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_4k() {
        let a = PhysicalAddress::new(0x1234_5678_9ABC_DEF0);
        let (p, o) = a.split::<Size4K>();
        assert_eq!(p.base().as_u64() & 0xFFF, 0);
        assert_eq!(o, 0xEF0);
        assert_eq!(p.base() + o, a);
    }

    #[test]
    fn split_and_join_64k() {
        let a = PhysicalAddress::new(0x0000_0008_1234_5678);
        let (p, o) = a.split::<Size64K>();
        assert_eq!(p.base().as_u64(), 0x0000_0008_1234_0000);
        assert_eq!(o, 0x5678);
    }

    #[test]
    fn pfn_round_trip_per_granule() {
        assert_eq!(PhysicalPage::<Size4K>::from_pfn(3).base().as_u64(), 0x3000);
        assert_eq!(PhysicalPage::<Size16K>::from_pfn(3).base().as_u64(), 0xC000);
        assert_eq!(PhysicalPage::<Size64K>::from_pfn(3).base().as_u64(), 0x3_0000);
        assert_eq!(PhysicalAddress::new(0x3_0000).page::<Size64K>().pfn(), 3);
    }

    #[test]
    fn frames_order_by_address() {
        let lo = Frame::from_pfn(10);
        let hi = Frame::from_pfn(11);
        assert!(lo < hi);
        assert_eq!(lo.next(), hi);
        assert_eq!(lo.checked_add(1), Some(hi));
        assert_eq!(Frame::from_pfn(u64::MAX >> 12).checked_add(1), None);
    }

    #[test]
    fn is_aligned() {
        assert!(PhysicalAddress::new(0x4000).is_aligned::<Size16K>());
        assert!(!PhysicalAddress::new(0x5000).is_aligned::<Size16K>());
        assert!(PhysicalAddress::new(0x5000).is_aligned::<Size4K>());
    }

    #[test]
    fn display_formats() {
        let f = Frame::from_pfn(0x80401);
        assert_eq!(format!("{f}"), "0x0000000080401000/4K");
        assert_eq!(format!("{}", f.base()), "0x0000000080401000");
    }
}
