//! # Hypervisor console
//!
//! Two things the rest of the hypervisor needs from "the console":
//!
//! * a [`log::Log`] backend, [`ConsoleLogger`], that formats records without
//!   allocating and hands them to a [`ConsoleSink`];
//! * a dispatch table for single-key debug commands, [`KeyHandlerTable`],
//!   through which subsystems expose on-demand dumps.
//!
//! ## Output format
//!
//! ```text
//! (hyp) [INFO] hyp_llc_coloring::geometry: LLC way size: 2048 KiB
//! ```
//!
//! ## Sinks
//!
//! With the `debugcon` feature on x86-64, [`DebugconSink`] writes to QEMU's
//! debug console (port `0x402`, enable with `-debugcon stdio`). Anything that
//! can take a `&str` can be a sink; tests use an in-memory buffer.
//!
//! ```rust
//! use hyp_console::{ConsoleLogger, NullSink};
//! use log::LevelFilter;
//!
//! static SINK: NullSink = NullSink;
//! static LOGGER: ConsoleLogger = ConsoleLogger::new(LevelFilter::Info, &SINK);
//!
//! LOGGER.init().expect("logger installed once");
//! log::info!("console up");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod keyhandler;
mod logger;
mod sink;

pub use keyhandler::{HELP_KEY, KeyHandler, KeyHandlerError, KeyHandlerTable};
pub use logger::ConsoleLogger;
pub use sink::{ConsoleSink, NullSink, SinkWriter};

#[cfg(all(feature = "debugcon", target_arch = "x86_64"))]
pub use sink::DebugconSink;
