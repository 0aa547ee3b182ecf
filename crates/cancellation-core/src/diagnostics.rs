// ─────────────────────────────────────────────────────────────────────
// Interflop Cancellation — Diagnostic Sink
// ─────────────────────────────────────────────────────────────────────
//! `log` backend that writes to the output stream handed over by the
//! host at pre-init.
//!
//! Records only exist on the rare paths (configuration errors, load
//! message, enabled cancellation warnings), so the sink sits behind a
//! plain mutex.

use std::io::Write;

use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

use crate::backend::BACKEND_NAME;

/// Line-oriented logger: `Info [interflop_cancellation]: <message>`.
pub struct StreamLogger {
    sink: Mutex<Box<dyn Write + Send>>,
    level: LevelFilter,
}

impl StreamLogger {
    pub fn new(sink: Box<dyn Write + Send>, level: LevelFilter) -> Self {
        Self {
            sink: Mutex::new(sink),
            level,
        }
    }
}

fn label(level: Level) -> &'static str {
    match level {
        Level::Error => "Error",
        Level::Warn => "Warning",
        Level::Info => "Info",
        Level::Debug => "Debug",
        Level::Trace => "Trace",
    }
}

impl Log for StreamLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut sink = self.sink.lock();
        // A failing host stream must never turn into an arithmetic failure.
        let _ = writeln!(
            sink,
            "{} [{}]: {}",
            label(record.level()),
            BACKEND_NAME,
            record.args()
        );
    }

    fn flush(&self) {
        let _ = self.sink.lock().flush();
    }
}

/// Install a `StreamLogger` as the process logger.
///
/// Returns `false` if a logger was already installed; the existing one
/// is kept.
pub fn install(sink: Box<dyn Write + Send>, level: LevelFilter) -> bool {
    match log::set_boxed_logger(Box::new(StreamLogger::new(sink, level))) {
        Ok(()) => {
            log::set_max_level(level);
            true
        }
        Err(_) => {
            log::debug!("diagnostic sink already installed, keeping it");
            false
        }
    }
}
