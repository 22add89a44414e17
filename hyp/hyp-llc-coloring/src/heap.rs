//! The colored page heap.
//!
//! One free list per color, each kept in ascending address order. A domain
//! allocates from the colors it was given; among those lists the page with
//! the highest address wins, which only needs a look at each list's tail.
//!
//! All list and accounting updates happen under a single lock: comparing
//! tails across several colors needs a consistent view of all of them. Cache
//! maintenance on an allocated page happens after the lock is dropped, once
//! the page is off every list and owned by the caller.

use crate::color::Color;
use crate::domain::DomainColoring;
use crate::error::{HeapError, InvariantViolation};
use crate::frame_table::{FrameTable, PageFlags, PageInfo, PageState};
use crate::geometry::LlcGeometry;
use crate::maintenance::PageMaintenance;
use alloc::boxed::Box;
use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec::Vec;
use bitfield_struct::bitfield;
use core::fmt;
use hyp_console::KeyHandler;
use hyp_memory_addresses::Frame;
use hyp_sync::SpinLock;
use log::{debug, info, trace};

/// Allocation modifiers.
#[bitfield(u8)]
#[derive(Eq, PartialEq)]
pub struct MemFlags {
    /// Skip the TLB flush owed by the page's previous owner.
    pub no_tlbflush: bool,
    /// Do not invalidate the instruction cache for the page.
    pub no_icache_flush: bool,
    /// Do not assign the page to the requesting domain.
    pub no_owner: bool,
    #[bits(5)]
    _res3: u8,
}

struct ColorLists {
    lists: Box<[Vec<Frame>]>,
    total_avail: u64,
}

impl ColorLists {
    fn new(nr_colors: usize) -> Self {
        let mut lists = Vec::new();
        assert!(
            lists.try_reserve_exact(nr_colors).is_ok(),
            "Unable to allocate memory for the colored heap ({nr_colors} color lists)"
        );
        lists.resize_with(nr_colors, Vec::new);
        Self {
            lists: lists.into_boxed_slice(),
            total_avail: 0,
        }
    }

    /// Insert keeping the list address-ordered.
    fn insert(&mut self, color: Color, page: Frame) {
        let list = &mut self.lists[color.index()];
        let at = list.partition_point(|p| *p <= page);
        list.insert(at, page);
    }
}

pub struct ColoredHeap<M> {
    geometry: LlcGeometry,
    frames: Arc<FrameTable>,
    maint: M,
    heap: SpinLock<Option<ColorLists>>,
}

impl<M: PageMaintenance> ColoredHeap<M> {
    /// An empty heap. The color lists are allocated on the first
    /// [`bulk_insert`](Self::bulk_insert).
    #[must_use]
    pub const fn new(geometry: LlcGeometry, frames: Arc<FrameTable>, maint: M) -> Self {
        Self {
            geometry,
            frames,
            maint,
            heap: SpinLock::new(None),
        }
    }

    #[must_use]
    pub const fn geometry(&self) -> &LlcGeometry {
        &self.geometry
    }

    #[must_use]
    pub const fn frames(&self) -> &Arc<FrameTable> {
        &self.frames
    }

    #[must_use]
    pub const fn maintenance(&self) -> &M {
        &self.maint
    }

    /// Donate `count` contiguous frames starting at `first`.
    ///
    /// # Errors
    /// [`HeapError::OutOfRange`] if the frame table does not cover the whole
    /// range, [`HeapError::AlreadyManaged`] if any frame of it already belongs
    /// to a heap. Nothing is donated in either case.
    ///
    /// # Panics
    /// If the color lists cannot be allocated.
    pub fn bulk_insert(&self, first: Frame, count: u64) -> Result<(), HeapError> {
        let mut pages = self
            .frames
            .range(first, count)
            .ok_or(HeapError::OutOfRange(first))?;
        if count == 0 {
            return Ok(());
        }

        self.heap.with_lock(|heap| {
            if let Some((page, _)) = pages.find(|(_, info)| is_managed(info)) {
                return Err(HeapError::AlreadyManaged(page));
            }

            let heap = heap.get_or_insert_with(|| ColorLists::new(self.geometry.nr_colors() as usize));
            for (page, info) in self.frames.range(first, count).into_iter().flatten() {
                info.set_flags(PageFlags::new().with_state(PageState::Free).with_colored(true));
                info.set_owner(None);
                heap.insert(self.geometry.page_to_color(page), page);
            }
            heap.total_avail += count;
            Ok(())
        })?;
        debug!("Colored heap: added {count} pages starting at {first}");
        Ok(())
    }

    /// Take the highest-addressed free page among `coloring`'s colors.
    ///
    /// `None` means none of those colors has a free page; nothing changes then.
    pub fn alloc(&self, memflags: MemFlags, coloring: &DomainColoring) -> Option<Frame> {
        let (page, previous) = self.heap.with_lock(|heap| {
            let heap = heap.as_mut()?;

            let mut best: Option<(Color, Frame)> = None;
            for &color in coloring.colors() {
                let Some(&tail) = heap.lists.get(color.index()).and_then(|l| l.last()) else {
                    continue;
                };
                if best.is_none_or(|(_, b)| tail > b) {
                    best = Some((color, tail));
                }
            }
            let (color, page) = best?;
            let info = self.frames.get(page)?;

            heap.lists[color.index()].pop();
            heap.total_avail -= 1;

            let previous = info.flags();
            info.set_flags(PageFlags::new().with_state(PageState::InUse).with_colored(true));
            info.set_owner(None);
            Some((page, (previous, info.tlbflush_timestamp())))
        })?;

        let (flags, stamp) = previous;
        if flags.need_tlbflush() && !memflags.no_tlbflush() {
            self.maint.flush_tlb_if_older(stamp);
        }
        if flags.need_scrub() {
            self.maint.scrub_page(page);
        }
        self.maint
            .flush_page_to_ram(page, !memflags.no_icache_flush());

        trace!(
            "Colored heap: allocated {page} of color {}",
            self.geometry.page_to_color(page)
        );
        Some(page)
    }

    /// Return `page` to its color list. With `need_scrub` the page is zeroed
    /// before it is handed out again.
    ///
    /// # Errors
    /// [`HeapError::OutOfRange`], [`HeapError::NotColored`] for pages this heap
    /// never received, and [`HeapError::DoubleFree`] for pages already free.
    pub fn free(&self, page: Frame, need_scrub: bool) -> Result<(), HeapError> {
        let info = self.frames.get(page).ok_or(HeapError::OutOfRange(page))?;
        let stamp = self.maint.tlbflush_clock();

        self.heap.with_lock(|heap| {
            let flags = info.flags();
            let heap = match heap.as_mut() {
                Some(heap) if flags.colored() => heap,
                _ => return Err(HeapError::NotColored(page)),
            };
            if flags.state() == PageState::Free {
                return Err(HeapError::DoubleFree(page));
            }

            // Other CPUs may still map a page a domain just gave back.
            let had_owner = info.owner().is_some();
            if had_owner {
                info.set_tlbflush_timestamp(stamp);
            }
            info.set_flags(
                PageFlags::new()
                    .with_state(PageState::Free)
                    .with_colored(true)
                    .with_need_tlbflush(had_owner)
                    .with_need_scrub(need_scrub),
            );
            info.set_owner(None);

            heap.insert(self.geometry.page_to_color(page), page);
            heap.total_avail += 1;
            Ok(())
        })?;

        trace!("Colored heap: freed {page}");
        Ok(())
    }

    #[must_use]
    pub fn total_avail_pages(&self) -> u64 {
        self.heap.with_lock(|heap| heap.as_ref().map_or(0, |h| h.total_avail))
    }

    #[must_use]
    pub fn free_pages_of_color(&self, color: Color) -> usize {
        self.heap.with_lock(|heap| {
            heap.as_ref()
                .and_then(|h| h.lists.get(color.index()))
                .map_or(0, Vec::len)
        })
    }

    /// The free pages of `color`, ascending.
    #[must_use]
    pub fn free_list(&self, color: Color) -> Vec<Frame> {
        self.heap.with_lock(|heap| {
            heap.as_ref()
                .and_then(|h| h.lists.get(color.index()))
                .map_or_else(Vec::new, Clone::clone)
        })
    }

    /// Per-color occupancy, copied under the lock.
    #[must_use]
    pub fn dump(&self) -> HeapDump {
        self.heap.with_lock(|heap| match heap {
            None => HeapDump::default(),
            Some(h) => HeapDump {
                pages_per_color: h.lists.iter().map(|l| l.len() as u64).collect(),
                total_avail: h.total_avail,
            },
        })
    }

    /// Verify list order, list membership, page state and accounting.
    ///
    /// # Errors
    /// The first violation found.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.heap.with_lock(|heap| {
            let Some(heap) = heap.as_ref() else {
                return Ok(());
            };

            let mut counted = 0u64;
            for (list, color) in heap.lists.iter().zip(0u32..) {
                let color = Color::new(color);
                if let Some(i) = list.windows(2).position(|w| w[0] >= w[1]) {
                    return Err(if list[i] == list[i + 1] {
                        InvariantViolation::Duplicate {
                            color,
                            page: list[i],
                        }
                    } else {
                        InvariantViolation::Unordered {
                            color,
                            index: i + 1,
                        }
                    });
                }
                for &page in list {
                    let actual = self.geometry.page_to_color(page);
                    if actual != color {
                        return Err(InvariantViolation::WrongList {
                            page,
                            list: color,
                            actual,
                        });
                    }
                    if !self.frames.get(page).is_some_and(is_free_colored) {
                        return Err(InvariantViolation::BadState(page));
                    }
                }
                counted += list.len() as u64;
            }

            if counted == heap.total_avail {
                Ok(())
            } else {
                Err(InvariantViolation::CountMismatch {
                    counted,
                    recorded: heap.total_avail,
                })
            }
        })
    }
}

fn is_managed(info: &PageInfo) -> bool {
    let flags = info.flags();
    flags.colored() || flags.ordinary()
}

fn is_free_colored(info: &PageInfo) -> bool {
    let flags = info.flags();
    flags.colored() && flags.state() == PageState::Free
}

impl<M: PageMaintenance> KeyHandler for ColoredHeap<M> {
    fn handle(&self, _key: char) {
        for line in self.dump().to_string().lines() {
            info!("{line}");
        }
    }
}

/// Snapshot of the colored heap's occupancy.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct HeapDump {
    pub pages_per_color: Vec<u64>,
    pub total_avail: u64,
}

impl fmt::Display for HeapDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dump coloring heap info")?;
        for (color, pages) in self.pages_per_color.iter().enumerate() {
            writeln!(f, "Heap[{color}]: {pages} pages")?;
        }
        write!(f, "Total number of pages: {}", self.total_avail)
    }
}
