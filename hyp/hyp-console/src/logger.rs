use crate::sink::{ConsoleSink, SinkWriter};
use core::fmt::Write;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct ConsoleLogger {
    max_level: LevelFilter,
    sink: &'static dyn ConsoleSink,
}

impl ConsoleLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter, sink: &'static dyn ConsoleSink) -> Self {
        Self { max_level, sink }
    }

    /// Install as the global logger. Call once during early boot.
    ///
    /// # Errors
    /// Fails if another logger has already been installed.
    pub fn init(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }

    #[must_use]
    pub const fn max_level(&self) -> LevelFilter {
        self.max_level
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Best effort; a failing sink has nowhere to report to.
        let _ = writeln!(
            SinkWriter(self.sink),
            "(hyp) [{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}
