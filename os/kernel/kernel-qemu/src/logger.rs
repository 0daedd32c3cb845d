use crate::{ByteSink, DebugPort, SinkWriter};
use core::fmt::Write;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// `log::Log` implementation writing `[LEVEL] target: message` lines to a [`ByteSink`].
pub struct QemuLogger<S = DebugPort> {
    sink: S,
    max_level: LevelFilter,
}

impl QemuLogger {
    /// Logger writing to QEMU's debug console.
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self::with_sink(DebugPort::QEMU, max_level)
    }
}

impl<S: ByteSink> QemuLogger<S> {
    #[must_use]
    pub const fn with_sink(sink: S, max_level: LevelFilter) -> Self {
        Self { sink, max_level }
    }

    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    #[must_use]
    pub const fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    /// Install as the global logger. Call this once during early init.
    ///
    /// # Errors
    /// Fails if another logger was installed before.
    pub fn init(&'static self) -> Result<(), SetLoggerError>
    where
        S: 'static,
    {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }
}

impl<S: ByteSink> Log for QemuLogger<S> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Best-effort; a sink cannot fail.
        let _ = writeln!(
            SinkWriter::new(&self.sink),
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        // unbuffered
    }
}
