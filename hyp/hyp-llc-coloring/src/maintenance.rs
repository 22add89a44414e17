use hyp_memory_addresses::Frame;

/// Cache, TLB and scrubbing operations the allocator needs from the platform.
///
/// The colored heap calls these without its lock held, on frames it has
/// already taken off the free lists.
pub trait PageMaintenance: Send + Sync {
    /// Clean and invalidate the frame's data cache lines to memory, and the
    /// instruction cache as well if `sync_icache` is set.
    fn flush_page_to_ram(&self, page: Frame, sync_icache: bool);

    /// Zero the frame.
    fn scrub_page(&self, page: Frame);

    /// Current value of the TLB flush clock.
    fn tlbflush_clock(&self) -> u64;

    /// Flush TLBs on every CPU that has not flushed since `timestamp`.
    fn flush_tlb_if_older(&self, timestamp: u64);
}

impl<T: PageMaintenance + ?Sized> PageMaintenance for alloc::sync::Arc<T> {
    fn flush_page_to_ram(&self, page: Frame, sync_icache: bool) {
        (**self).flush_page_to_ram(page, sync_icache);
    }

    fn scrub_page(&self, page: Frame) {
        (**self).scrub_page(page);
    }

    fn tlbflush_clock(&self) -> u64 {
        (**self).tlbflush_clock()
    }

    fn flush_tlb_if_older(&self, timestamp: u64) {
        (**self).flush_tlb_if_older(timestamp);
    }
}
