#![allow(dead_code)]

use hyp_llc_coloring::{FallbackHeap, MemFlags, PageMaintenance};
use hyp_memory_addresses::Frame;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Counts maintenance requests and advances a fake TLB clock on every flush.
#[derive(Debug, Default)]
pub struct CountingMaintenance {
    clock: AtomicU64,
    pub flushes: AtomicU64,
    pub scrubs: AtomicU64,
    pub tlb_flushes: AtomicU64,
}

impl PageMaintenance for CountingMaintenance {
    fn flush_page_to_ram(&self, _page: Frame, _sync_icache: bool) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn scrub_page(&self, _page: Frame) {
        self.scrubs.fetch_add(1, Ordering::SeqCst);
    }

    fn tlbflush_clock(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    fn flush_tlb_if_older(&self, _timestamp: u64) {
        self.clock.fetch_add(1, Ordering::SeqCst);
        self.tlb_flushes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Ordinary heap backed by a vector.
#[derive(Debug, Default)]
pub struct VecHeap {
    pub free: Mutex<Vec<Frame>>,
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
