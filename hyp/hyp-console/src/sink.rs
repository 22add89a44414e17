use core::fmt::{self, Write};

/// Destination for console bytes.
///
/// Sinks are shared by every CPU, so writes take `&self`; a sink that needs
/// mutable state brings its own lock.
pub trait ConsoleSink: Sync {
    fn write_str(&self, s: &str);
}

/// Discards everything.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullSink;

impl ConsoleSink for NullSink {
    #[inline]
    fn write_str(&self, _s: &str) {}
}

/// [`fmt::Write`] adapter over a shared sink.
pub struct SinkWriter<'a>(pub &'a dyn ConsoleSink);

impl Write for SinkWriter<'_> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

/// QEMU debug console on I/O port `0x402`.
#[cfg(all(feature = "debugcon", target_arch = "x86_64"))]
#[derive(Debug, Default, Copy, Clone)]
pub struct DebugconSink;

#[cfg(all(feature = "debugcon", target_arch = "x86_64"))]
impl DebugconSink {
    const PORT: u16 = 0x402;

    #[allow(clippy::inline_always)]
    #[inline(always)]
    fn putc(b: u8) {
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") Self::PORT,
                in("al") b,
                options(nomem, nostack, preserves_flags)
            );
        }
    }
}

#[cfg(all(feature = "debugcon", target_arch = "x86_64"))]
impl ConsoleSink for DebugconSink {
    #[inline]
    fn write_str(&self, s: &str) {
        for b in s.bytes() {
            Self::putc(b);
        }
    }
}
