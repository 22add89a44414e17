//! Page allocation on behalf of domains.
//!
//! Colored domains are served by the [`ColoredHeap`] only; everything else
//! (uncolored domains, and the boot memory reserved with `buddy-alloc-size`)
//! goes to the ordinary heap behind [`FallbackHeap`].

use crate::coloring::LlcColoring;
use crate::domain::Domain;
use crate::error::{DomainError, HeapError};
use crate::frame_table::{FrameTable, PageFlags, PageState};
use crate::heap::{ColoredHeap, MemFlags};
use crate::maintenance::PageMaintenance;
use alloc::sync::Arc;
use hyp_console::{KeyHandler, KeyHandlerTable};
use hyp_memory_addresses::{Frame, PageSize, Size4K};
use hyp_sync::SpinLock;
use log::{debug, info, warn};

/// The ordinary (uncolored) page heap.
pub trait FallbackHeap: Send + Sync {
    /// Hand `count` frames starting at `first` to the heap.
    fn donate(&self, first: Frame, count: u64);

    fn alloc_page(&self, memflags: MemFlags) -> Option<Frame>;

    fn free_page(&self, page: Frame, need_scrub: bool);
}

/// No ordinary heap: donations are dropped, allocations fail.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoFallback;

impl FallbackHeap for NoFallback {
    fn donate(&self, first: Frame, count: u64) {
        warn!("No ordinary heap; dropping {count} pages starting at {first}");
    }

    fn alloc_page(&self, _memflags: MemFlags) -> Option<Frame> {
        None
    }

    fn free_page(&self, page: Frame, _need_scrub: bool) {
        warn!("No ordinary heap; leaking {page}");
    }
}

pub struct DomainHeap<M, F> {
    frames: Arc<FrameTable>,
    colored: Option<Arc<ColoredHeap<M>>>,
    fallback: F,
    /// Boot frames still owed to the ordinary heap while coloring.
    buddy_pages_left: SpinLock<u64>,
}

impl<M, F> DomainHeap<M, F>
where
    M: PageMaintenance + 'static,
    F: FallbackHeap,
{
    /// `buddy_alloc_size` bytes of boot memory are kept for the ordinary heap
    /// when coloring is enabled.
    #[must_use]
    pub fn new(
        llc: &LlcColoring,
        frames: Arc<FrameTable>,
        maint: M,
        fallback: F,
        buddy_alloc_size: u64,
    ) -> Self {
        let colored = llc
            .geometry()
            .map(|g| Arc::new(ColoredHeap::new(*g, Arc::clone(&frames), maint)));
        Self {
            frames,
            colored,
            fallback,
            buddy_pages_left: SpinLock::new(buddy_alloc_size >> Size4K::SHIFT),
        }
    }

    #[must_use]
    pub const fn colored_heap(&self) -> Option<&Arc<ColoredHeap<M>>> {
        self.colored.as_ref()
    }

    #[must_use]
    pub const fn fallback(&self) -> &F {
        &self.fallback
    }

    #[must_use]
    pub const fn frames(&self) -> &Arc<FrameTable> {
        &self.frames
    }

    /// Register `'H'` (colored heap dump) if coloring is enabled.
    pub fn register_debug_keys(&self, keys: &KeyHandlerTable) {
        if let Some(heap) = &self.colored {
            let handler: Arc<dyn KeyHandler> = heap.clone();
            if let Err(e) = keys.register('H', "dump colored heap info", handler) {
                warn!("Cannot register colored heap dump: {e}");
            }
        }
    }

    /// Populate the heaps with boot memory.
    ///
    /// # Errors
    /// [`HeapError::OutOfRange`] if the frames are not covered by the frame table.
    pub fn init_boot_pages(&self, first: Frame, count: u64) -> Result<(), HeapError> {
        let Some(colored) = &self.colored else {
            self.donate_ordinary(first, count);
            return Ok(());
        };
        if !self.frames.contains_range(first, count) {
            return Err(HeapError::OutOfRange(first));
        }

        let reserved = self.buddy_pages_left.with_lock(|left| {
            let take = (*left).min(count);
            *left -= take;
            take
        });
        if reserved != 0 {
            debug!("Keeping {reserved} pages starting at {first} for the ordinary heap");
            self.donate_ordinary(first, reserved);
        }

        let rest = count - reserved;
        match first.checked_add(reserved) {
            Some(start) if rest != 0 => colored.bulk_insert(start, rest),
            _ => Ok(()),
        }
    }

    /// Allocate a page for `d` and, unless `memflags.no_owner()`, assign it.
    ///
    /// A colored domain never receives an uncolored page; `None` is its
    /// out-of-memory.
    pub fn alloc_domheap_page(&self, d: &Domain, memflags: MemFlags) -> Option<Frame> {
        let page = match (d.coloring(), &self.colored) {
            (Some(coloring), Some(heap)) => heap.alloc(memflags, coloring)?,
            (Some(_), None) => return None,
            (None, _) => {
                let page = self.fallback.alloc_page(memflags)?;
                if let Some(info) = self.frames.get(page) {
                    info.set_flags(ordinary(PageState::InUse));
                }
                page
            }
        };

        if !memflags.no_owner() {
            match self.frames.get(page) {
                Some(info) => d.assign_page(page, info),
                None => warn!("{}: {page} has no frame descriptor, not assigned", d.id()),
            }
        }
        Some(page)
    }

    /// Give a page of `d` back to the heap it came from.
    ///
    /// # Errors
    /// [`DomainError::NotOwner`] if another domain owns the page.
    pub fn free_domheap_page(&self, d: &Domain, page: Frame) -> Result<(), DomainError> {
        self.free_owned(d, page, false)
    }

    /// Free every page `d` still owns, scrubbing them. Must run before the
    /// domain is dropped.
    ///
    /// A page that cannot be returned does not stop the others. If it is
    /// still owned by `d` it goes back on the domain's page list.
    ///
    /// # Errors
    /// The first page that could not be returned.
    pub fn relinquish(&self, d: &Domain) -> Result<(), DomainError> {
        let pages = d.take_pages();
        info!("{}: relinquishing {} pages", d.id(), pages.len());

        let mut first_error = None;
        for page in pages {
            let Err(e) = self.return_page(page, true) else {
                continue;
            };
            warn!("{}: cannot return {page}: {e}", d.id());
            if let Some(info) = self.frames.get(page).filter(|i| i.owner() == Some(d.id())) {
                d.assign_page(page, info);
            }
            first_error.get_or_insert(e);
        }
        first_error.map_or(Ok(()), Err)
    }

    fn free_owned(&self, d: &Domain, page: Frame, need_scrub: bool) -> Result<(), DomainError> {
        let info = self.frames.get(page).ok_or(HeapError::OutOfRange(page))?;
        let owned = match info.owner() {
            Some(owner) if owner == d.id() => true,
            None => false,
            Some(_) => {
                return Err(DomainError::NotOwner {
                    domain: d.id(),
                    page,
                });
            }
        };
        // The page stays on the domain's list unless the heap took it back.
        self.return_page(page, need_scrub)?;
        if owned {
            let _ = d.release_page(page);
        }
        Ok(())
    }

    fn return_page(&self, page: Frame, need_scrub: bool) -> Result<(), DomainError> {
        let info = self.frames.get(page).ok_or(HeapError::OutOfRange(page))?;
        let flags = info.flags();
        match &self.colored {
            Some(heap) if flags.colored() => heap.free(page, need_scrub)?,
            _ if !flags.ordinary() => return Err(HeapError::Unmanaged(page).into()),
            _ if flags.state() == PageState::Free => {
                return Err(HeapError::DoubleFree(page).into());
            }
            _ => {
                info.set_flags(ordinary(PageState::Free));
                info.set_owner(None);
                self.fallback.free_page(page, need_scrub);
            }
        }
        Ok(())
    }

    /// Hand frames to the ordinary heap, marking those the frame table covers.
    fn donate_ordinary(&self, first: Frame, count: u64) {
        for page in (0..count).filter_map(|i| first.checked_add(i)) {
            if let Some(info) = self.frames.get(page) {
                info.set_flags(ordinary(PageState::Free));
                info.set_owner(None);
            }
        }
        self.fallback.donate(first, count);
    }
}

const fn ordinary(state: PageState) -> PageFlags {
    PageFlags::new().with_state(state).with_ordinary(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainConfig;
    use crate::geometry::LlcGeometry;
    use crate::testing::RecordingMaintenance;
    use std::sync::Mutex;

    #[derive(Default)]
    struct VecHeap {
        free: Mutex<Vec<Frame>>,
    }

    impl FallbackHeap for VecHeap {
        fn donate(&self, first: Frame, count: u64) {
            let mut free = self.free.lock().unwrap();
            free.extend((0..count).map(|i| first.checked_add(i).unwrap()));
        }

        fn alloc_page(&self, _memflags: MemFlags) -> Option<Frame> {
            self.free.lock().unwrap().pop()
        }

        fn free_page(&self, page: Frame, _need_scrub: bool) {
            self.free.lock().unwrap().push(page);
        }
    }

    const BASE: u64 = 0x4_0000;

    fn setup(llc: &LlcColoring, buddy_pages: u64) -> DomainHeap<RecordingMaintenance, VecHeap> {
        let frames = Arc::new(FrameTable::new(Frame::from_pfn(BASE), 64));
        DomainHeap::new(
            llc,
            frames,
            RecordingMaintenance::default(),
            VecHeap::default(),
            buddy_pages * Size4K::SIZE,
        )
    }

    fn llc() -> LlcColoring {
        LlcColoring::with_geometry(LlcGeometry::from_way_size::<Size4K>(8 * 4096).unwrap())
    }

    #[test]
    fn boot_memory_is_split_between_heaps() {
        let llc = llc();
        let heap = setup(&llc, 16);
        heap.init_boot_pages(Frame::from_pfn(BASE), 10).unwrap();
        heap.init_boot_pages(Frame::from_pfn(BASE + 10), 54).unwrap();

        assert_eq!(heap.fallback().free.lock().unwrap().len(), 16);
        let colored = heap.colored_heap().unwrap();
        assert_eq!(colored.total_avail_pages(), 48);
        assert_eq!(colored.free_list(crate::Color::new(0)).first(), Some(&Frame::from_pfn(BASE + 16)));
    }

    #[test]
    fn uncolored_boot_memory_goes_to_fallback() {
        let llc = LlcColoring::new();
        let heap = setup(&llc, 16);
        assert!(heap.colored_heap().is_none());
        heap.init_boot_pages(Frame::from_pfn(BASE), 64).unwrap();
        assert_eq!(heap.fallback().free.lock().unwrap().len(), 64);
    }

    #[test]
    fn colored_domain_never_falls_back() {
        let llc = llc();
        let heap = setup(&llc, 8);
        heap.init_boot_pages(Frame::from_pfn(BASE), 16).unwrap();
        let d = Domain::create(DomainConfig::guest(1).with_llc_colors("3"), &llc).unwrap();

        assert_eq!(heap.alloc_domheap_page(&d, MemFlags::new()), Some(Frame::from_pfn(BASE + 11)));
        assert_eq!(heap.alloc_domheap_page(&d, MemFlags::new()), None);
        assert_eq!(heap.fallback().free.lock().unwrap().len(), 8);
        assert_eq!(d.tot_pages(), 1);
        heap.relinquish(&d).unwrap();
    }

    #[test]
    fn free_routes_by_colored_flag() {
        let llc = LlcColoring::new();
        let heap = setup(&llc, 0);
        heap.init_boot_pages(Frame::from_pfn(BASE), 4).unwrap();
        let d = Domain::create(DomainConfig::guest(2), &llc).unwrap();
        let page = heap.alloc_domheap_page(&d, MemFlags::new()).unwrap();
        assert_eq!(heap.frames().get(page).unwrap().owner(), Some(d.id()));
        heap.free_domheap_page(&d, page).unwrap();
        assert_eq!(heap.fallback().free.lock().unwrap().len(), 4);
        assert_eq!(heap.frames().get(page).unwrap().owner(), None);
        assert_eq!(d.tot_pages(), 0);
    }

    #[test]
    fn cannot_free_someone_elses_page() {
        let llc = llc();
        let heap = setup(&llc, 0);
        heap.init_boot_pages(Frame::from_pfn(BASE), 64).unwrap();
        let a = Domain::create(DomainConfig::guest(1), &llc).unwrap();
        let b = Domain::create(DomainConfig::guest(2), &llc).unwrap();
        let page = heap.alloc_domheap_page(&a, MemFlags::new()).unwrap();
        assert_eq!(
            heap.free_domheap_page(&b, page),
            Err(DomainError::NotOwner {
                domain: b.id(),
                page
            })
        );
        heap.relinquish(&a).unwrap();
        heap.relinquish(&b).unwrap();
    }

    #[test]
    fn relinquish_scrubs_and_empties_the_domain() {
        let llc = llc();
        let heap = setup(&llc, 0);
        heap.init_boot_pages(Frame::from_pfn(BASE), 64).unwrap();
        let d = Domain::create(DomainConfig::guest(1).with_llc_colors("0-1"), &llc).unwrap();
        for _ in 0..5 {
            heap.alloc_domheap_page(&d, MemFlags::new()).unwrap();
        }
        let owned = d.page_list();
        assert_eq!(owned.len(), 5);

        heap.relinquish(&d).unwrap();
        assert_eq!(d.tot_pages(), 0);

        let colored = heap.colored_heap().unwrap();
        assert_eq!(colored.total_avail_pages(), 64);
        colored.check_invariants().unwrap();
        assert!(heap.frames().leaked_colored_pages().is_empty());
        for page in owned {
            let flags = heap.frames().get(page).unwrap().flags();
            assert!(flags.need_scrub() && flags.need_tlbflush());
        }
    }

    #[test]
    fn relinquish_returns_every_page_despite_errors() {
        let llc = llc();
        let heap = setup(&llc, 0);
        heap.init_boot_pages(Frame::from_pfn(BASE), 64).unwrap();
        let d = Domain::create(DomainConfig::guest(1), &llc).unwrap();
        let pages: Vec<Frame> = (0..4)
            .map(|_| heap.alloc_domheap_page(&d, MemFlags::new()).unwrap())
            .collect();

        // Freed behind the domain's back: still on its page list.
        let colored = heap.colored_heap().unwrap();
        colored.free(pages[0], false).unwrap();

        assert_eq!(
            heap.relinquish(&d),
            Err(DomainError::Heap(HeapError::DoubleFree(pages[0])))
        );
        assert_eq!(d.tot_pages(), 0);
        assert_eq!(colored.total_avail_pages(), 64);
        colored.check_invariants().unwrap();
        for page in &pages {
            assert_eq!(heap.frames().get(*page).unwrap().owner(), None);
        }
        assert!(heap.frames().leaked_colored_pages().is_empty());
    }

    #[test]
    fn ordinary_frees_need_a_page_the_heap_handed_out() {
        let llc = LlcColoring::new();
        let heap = setup(&llc, 0);
        heap.init_boot_pages(Frame::from_pfn(BASE), 4).unwrap();
        let d = Domain::create(DomainConfig::guest(2), &llc).unwrap();

        // Never donated.
        let stray = Frame::from_pfn(BASE + 10);
        assert_eq!(
            heap.free_domheap_page(&d, stray),
            Err(DomainError::Heap(HeapError::Unmanaged(stray)))
        );
        // Donated but still free.
        let idle = Frame::from_pfn(BASE);
        assert_eq!(
            heap.free_domheap_page(&d, idle),
            Err(DomainError::Heap(HeapError::DoubleFree(idle)))
        );
        assert_eq!(heap.fallback().free.lock().unwrap().len(), 4);

        let page = heap.alloc_domheap_page(&d, MemFlags::new()).unwrap();
        let flags = heap.frames().get(page).unwrap().flags();
        assert!(flags.ordinary() && flags.state() == PageState::InUse);
        heap.free_domheap_page(&d, page).unwrap();
        assert_eq!(heap.fallback().free.lock().unwrap().len(), 4);
    }

    #[test]
    fn unowned_allocation_is_reported_as_leak() {
        let llc = llc();
        let heap = setup(&llc, 0);
        heap.init_boot_pages(Frame::from_pfn(BASE), 64).unwrap();
        let d = Domain::create(DomainConfig::guest(1), &llc).unwrap();
        let page = heap
            .alloc_domheap_page(&d, MemFlags::new().with_no_owner(true))
            .unwrap();
        assert_eq!(d.tot_pages(), 0);
        assert_eq!(heap.frames().leaked_colored_pages(), vec![page]);

        heap.free_domheap_page(&d, page).unwrap();
        assert!(heap.frames().leaked_colored_pages().is_empty());
    }
}
