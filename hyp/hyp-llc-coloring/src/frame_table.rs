//! Per-frame metadata for the memory the allocators manage.

use crate::domain::DomainId;
use alloc::boxed::Box;
use alloc::vec::Vec;
use bitfield_struct::bitfield;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use hyp_memory_addresses::Frame;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum PageState {
    InUse = 0,
    Free = 1,
}

impl PageState {
    #[must_use]
    pub const fn from_bits(value: u8) -> Self {
        match value {
            0 => Self::InUse,
            _ => Self::Free,
        }
    }

    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }
}

/// Allocation state of one frame.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct PageFlags {
    /// Bit 0 — free or in use.
    #[bits(1)]
    pub state: PageState,
    /// Bit 1 — managed by the colored heap.
    pub colored: bool,
    /// Bit 2 — the page was freed by a domain; TLBs older than the stamp may still map it.
    pub need_tlbflush: bool,
    /// Bit 3 — contents must be zeroed before the next allocation.
    pub need_scrub: bool,
    /// Bits 4–7 — page type of the current user.
    #[bits(4)]
    pub page_type: u8,
    /// Bit 8 — managed by the ordinary heap.
    pub ordinary: bool,
    #[bits(23)]
    _res9: u32,
}

const NO_OWNER: u32 = u32::MAX;

/// Descriptor of one physical frame.
///
/// Fields are atomics so that readers never tear; writers of colored pages
/// hold the colored heap lock.
#[derive(Debug)]
pub struct PageInfo {
    flags: AtomicU32,
    owner: AtomicU32,
    tlbflush_timestamp: AtomicU64,
}

impl Default for PageInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl PageInfo {
    /// A frame still held by whoever owned it at boot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            flags: AtomicU32::new(PageFlags::new().with_state(PageState::InUse).into_bits()),
            owner: AtomicU32::new(NO_OWNER),
            tlbflush_timestamp: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn flags(&self) -> PageFlags {
        PageFlags::from_bits(self.flags.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_flags(&self, flags: PageFlags) {
        self.flags.store(flags.into_bits(), Ordering::Release);
    }

    #[inline]
    pub fn owner(&self) -> Option<DomainId> {
        match self.owner.load(Ordering::Acquire) {
            NO_OWNER => None,
            #[allow(clippy::cast_possible_truncation)]
            id => Some(DomainId::new(id as u16)),
        }
    }

    #[inline]
    pub fn set_owner(&self, owner: Option<DomainId>) {
        let raw = owner.map_or(NO_OWNER, |d| u32::from(d.as_u16()));
        self.owner.store(raw, Ordering::Release);
    }

    #[inline]
    pub fn tlbflush_timestamp(&self) -> u64 {
        self.tlbflush_timestamp.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_tlbflush_timestamp(&self, stamp: u64) {
        self.tlbflush_timestamp.store(stamp, Ordering::Release);
    }
}

/// Descriptors for a contiguous range of frames.
#[derive(Debug)]
pub struct FrameTable {
    first: Frame,
    pages: Box<[PageInfo]>,
}

impl FrameTable {
    /// Cover `count` frames starting at `first`, all initially in use.
    #[must_use]
    pub fn new(first: Frame, count: usize) -> Self {
        Self {
            first,
            pages: (0..count).map(|_| PageInfo::new()).collect(),
        }
    }

    #[must_use]
    pub const fn first(&self) -> Frame {
        self.first
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    fn index_of(&self, frame: Frame) -> Option<usize> {
        let offset = frame.pfn().checked_sub(self.first.pfn())?;
        usize::try_from(offset).ok().filter(|&i| i < self.pages.len())
    }

    #[must_use]
    pub fn contains(&self, frame: Frame) -> bool {
        self.index_of(frame).is_some()
    }

    /// Whether all of `count` frames starting at `first` are covered.
    #[must_use]
    pub fn contains_range(&self, first: Frame, count: u64) -> bool {
        match count {
            0 => true,
            n => first
                .checked_add(n - 1)
                .is_some_and(|last| self.contains(first) && self.contains(last)),
        }
    }

    #[must_use]
    pub fn get(&self, frame: Frame) -> Option<&PageInfo> {
        self.index_of(frame).map(|i| &self.pages[i])
    }

    /// Every frame with its descriptor, ascending.
    pub fn iter(&self) -> impl Iterator<Item = (Frame, &PageInfo)> {
        let first = self.first.pfn();
        self.pages
            .iter()
            .zip(first..)
            .map(|(info, pfn)| (Frame::from_pfn(pfn), info))
    }

    /// The `count` frames starting at `first`, or `None` unless all are covered.
    pub fn range(
        &self,
        first: Frame,
        count: u64,
    ) -> Option<impl Iterator<Item = (Frame, &PageInfo)>> {
        if !self.contains_range(first, count) {
            return None;
        }
        let start = self.index_of(first).unwrap_or(self.pages.len());
        let count = usize::try_from(count).ok()?;
        Some(self.iter().skip(start).take(count))
    }

    /// Colored frames that are in use but belong to nobody.
    ///
    /// After a domain has been torn down this must be empty unless frames
    /// were deliberately allocated without an owner.
    #[must_use]
    pub fn leaked_colored_pages(&self) -> Vec<Frame> {
        self.iter()
            .filter(|(_, info)| {
                let flags = info.flags();
                flags.colored() && flags.state() == PageState::InUse && info.owner().is_none()
            })
            .map(|(frame, _)| frame)
            .collect()
    }
}
