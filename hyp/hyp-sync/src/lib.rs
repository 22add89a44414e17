//! # Hypervisor synchronization primitives
//!
//! - [`SpinLock`]: a FIFO ticket lock guarding one value; waiters are served
//!   in arrival order so a busy CPU cannot starve the others out of a heap.
//! - [`SyncOnceCell`]: a value published exactly once, readable lock-free
//!   afterwards.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;
mod sync_once_cell;

pub use spin_lock::{SpinLock, SpinLockGuard};
pub use sync_once_cell::SyncOnceCell;
