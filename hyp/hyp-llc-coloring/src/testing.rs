//! Fakes for unit tests.

use crate::maintenance::PageMaintenance;
use hyp_memory_addresses::Frame;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Records every maintenance request instead of performing it.
#[derive(Debug, Default)]
pub struct RecordingMaintenance {
    clock: AtomicU64,
    flushed: Mutex<Vec<(Frame, bool)>>,
    scrubbed: Mutex<Vec<Frame>>,
    tlb_flushes: Mutex<Vec<u64>>,
}

impl RecordingMaintenance {
    pub fn set_clock(&self, now: u64) {
        self.clock.store(now, Ordering::SeqCst);
    }

    pub fn flushed(&self) -> Vec<(Frame, bool)> {
        self.flushed.lock().unwrap().clone()
    }

    pub fn scrubbed(&self) -> Vec<Frame> {
        self.scrubbed.lock().unwrap().clone()
    }

    pub fn tlb_flushes(&self) -> Vec<u64> {
        self.tlb_flushes.lock().unwrap().clone()
    }
}

impl PageMaintenance for RecordingMaintenance {
    fn flush_page_to_ram(&self, page: Frame, sync_icache: bool) {
        self.flushed.lock().unwrap().push((page, sync_icache));
    }

    fn scrub_page(&self, page: Frame) {
        self.scrubbed.lock().unwrap().push(page);
    }

    fn tlbflush_clock(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    fn flush_tlb_if_older(&self, timestamp: u64) {
        self.tlb_flushes.lock().unwrap().push(timestamp);
    }
}
